//! Per-category metadata.
//!
//! Each category carries its own small set of optional descriptive fields.
//! The union is internally tagged by `category`, so a payload can never carry
//! research fields on a publication.

use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::error::ValidationError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case", deny_unknown_fields)]
pub enum CategoryMetadata {
    Personal {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        document_kind: Option<String>,
    },
    Research {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        project_title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        funding_source: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        year: Option<u16>,
    },
    Publication {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        journal: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        doi: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        year: Option<u16>,
    },
    CommunityService {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        activity: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        year: Option<u16>,
    },
    IntellectualProperty {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        registration_number: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ip_type: Option<String>,
    },
    Recognition {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        award: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        issuer: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        year: Option<u16>,
    },
    Other,
}

impl CategoryMetadata {
    /// Empty metadata for a category.
    pub fn empty(category: Category) -> Self {
        match category {
            Category::Personal => Self::Personal {
                document_kind: None,
            },
            Category::Research => Self::Research {
                project_title: None,
                funding_source: None,
                year: None,
            },
            Category::Publication => Self::Publication {
                journal: None,
                doi: None,
                year: None,
            },
            Category::CommunityService => Self::CommunityService {
                activity: None,
                location: None,
                year: None,
            },
            Category::IntellectualProperty => Self::IntellectualProperty {
                registration_number: None,
                ip_type: None,
            },
            Category::Recognition => Self::Recognition {
                award: None,
                issuer: None,
                year: None,
            },
            Category::Other => Self::Other,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Self::Personal { .. } => Category::Personal,
            Self::Research { .. } => Category::Research,
            Self::Publication { .. } => Category::Publication,
            Self::CommunityService { .. } => Category::CommunityService,
            Self::IntellectualProperty { .. } => Category::IntellectualProperty,
            Self::Recognition { .. } => Category::Recognition,
            Self::Other => Category::Other,
        }
    }

    /// Parse a JSON metadata payload and check it belongs to `category`.
    ///
    /// A payload without a `category` key is tagged with the expected one
    /// before decoding.
    pub fn parse_for(category: Category, raw: &str) -> Result<Self, ValidationError> {
        let mut value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| ValidationError::invalid("metadata", e.to_string()))?;
        let obj = value
            .as_object_mut()
            .ok_or_else(|| ValidationError::invalid("metadata", "expected a JSON object"))?;
        obj.entry("category")
            .or_insert_with(|| serde_json::Value::String(category.as_str().to_string()));

        let meta: Self = serde_json::from_value(value)
            .map_err(|e| ValidationError::invalid("metadata", e.to_string()))?;
        if meta.category() != category {
            return Err(ValidationError::invalid(
                "metadata",
                format!("metadata is for {}, document is {}", meta.category(), category),
            ));
        }
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matches_category() {
        for c in Category::ALL {
            assert_eq!(CategoryMetadata::empty(c).category(), c);
        }
    }

    #[test]
    fn parse_untagged_payload_for_category() {
        let meta =
            CategoryMetadata::parse_for(Category::Publication, r#"{"journal":"JIT","year":2023}"#)
                .unwrap();
        assert_eq!(
            meta,
            CategoryMetadata::Publication {
                journal: Some("JIT".into()),
                doi: None,
                year: Some(2023),
            }
        );
    }

    #[test]
    fn fields_from_another_category_are_rejected() {
        let err =
            CategoryMetadata::parse_for(Category::Research, r#"{"journal":"JIT"}"#).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidField { field: "metadata", .. }));
    }

    #[test]
    fn mismatched_tag_is_rejected() {
        let err = CategoryMetadata::parse_for(
            Category::Research,
            r#"{"category":"recognition","award":"Best Lecturer"}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("metadata is for recognition"));
    }

    #[test]
    fn serialized_form_is_tagged() {
        let json = serde_json::to_value(CategoryMetadata::Recognition {
            award: Some("Dosen Berprestasi".into()),
            issuer: None,
            year: None,
        })
        .unwrap();
        assert_eq!(json["category"], "recognition");
        assert_eq!(json["award"], "Dosen Berprestasi");
        assert!(json.get("issuer").is_none());
    }
}
