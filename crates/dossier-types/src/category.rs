use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{TypeError, ValidationError};

/// Accreditation category a document is filed under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Personal,
    Research,
    Publication,
    CommunityService,
    IntellectualProperty,
    Recognition,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Self::Personal,
        Self::Research,
        Self::Publication,
        Self::CommunityService,
        Self::IntellectualProperty,
        Self::Recognition,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Personal => "personal",
            Self::Research => "research",
            Self::Publication => "publication",
            Self::CommunityService => "community_service",
            Self::IntellectualProperty => "intellectual_property",
            Self::Recognition => "recognition",
            Self::Other => "other",
        }
    }

    /// Kind of record a bare related-item id refers to in this category.
    pub fn related_item_type(&self) -> RelatedItemType {
        match self {
            Self::Personal => RelatedItemType::PersonalRecord,
            Self::Research => RelatedItemType::ResearchProject,
            Self::Publication => RelatedItemType::Publication,
            Self::CommunityService => RelatedItemType::CommunityService,
            Self::IntellectualProperty => RelatedItemType::IntellectualProperty,
            Self::Recognition => RelatedItemType::Recognition,
            Self::Other => RelatedItemType::Other,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| TypeError::UnknownCategory(s.to_string()))
    }
}

/// Kind of record a document can be attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelatedItemType {
    ResearchProject,
    Publication,
    CommunityService,
    IntellectualProperty,
    Recognition,
    PersonalRecord,
    /// Record kind not covered above.
    Other,
}

impl RelatedItemType {
    pub const ALL: [RelatedItemType; 7] = [
        Self::ResearchProject,
        Self::Publication,
        Self::CommunityService,
        Self::IntellectualProperty,
        Self::Recognition,
        Self::PersonalRecord,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResearchProject => "research_project",
            Self::Publication => "publication",
            Self::CommunityService => "community_service",
            Self::IntellectualProperty => "intellectual_property",
            Self::Recognition => "recognition",
            Self::PersonalRecord => "personal_record",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for RelatedItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelatedItemType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| TypeError::UnknownRelatedItemType(s.to_string()))
    }
}

/// Typed foreign reference to the record a document is attached to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedItem {
    #[serde(rename = "type")]
    pub item_type: RelatedItemType,
    pub id: String,
}

impl RelatedItem {
    pub fn new(item_type: RelatedItemType, id: impl Into<String>) -> Self {
        Self {
            item_type,
            id: id.into(),
        }
    }

    /// Build from the two optional form fields.
    ///
    /// An id without a type takes the type implied by `category`. A type
    /// without an id is rejected.
    pub fn from_parts(
        category: Category,
        item_type: Option<&str>,
        id: Option<&str>,
    ) -> Result<Option<Self>, ValidationError> {
        let item_type = item_type.map(str::trim).filter(|s| !s.is_empty());
        let id = id.map(str::trim).filter(|s| !s.is_empty());
        match (item_type, id) {
            (None, None) => Ok(None),
            (Some(t), Some(id)) => Ok(Some(Self::new(t.parse()?, id))),
            (None, Some(id)) => Ok(Some(Self::new(category.related_item_type(), id))),
            (Some(_), None) => Err(ValidationError::invalid(
                "relatedItemId",
                "required when relatedItemType is set",
            )),
        }
    }
}
