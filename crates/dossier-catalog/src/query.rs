use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use dossier_types::{Category, Document, OwnerId, RelatedItem, RelatedItemType};

/// Filter over catalog documents.
///
/// Every set field must match. `text` is a case-insensitive substring match
/// over title, description and file name; `tags` matches documents carrying
/// any of the listed tags. Deleted documents are excluded unless
/// `include_deleted` is set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentQuery {
    pub owner: Option<OwnerId>,
    pub category: Option<Category>,
    pub related_item_type: Option<RelatedItemType>,
    pub related_item_id: Option<String>,
    pub text: Option<String>,
    pub tags: BTreeSet<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub include_deleted: bool,
}

impl DocumentQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn owned_by(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn in_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    pub fn related_to(mut self, item: &RelatedItem) -> Self {
        self.related_item_type = Some(item.item_type);
        self.related_item_id = Some(item.id.clone());
        self
    }

    pub fn matching(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.text = (!text.trim().is_empty()).then_some(text);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn created_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_from = from;
        self.created_to = to;
        self
    }

    pub fn including_deleted(mut self) -> Self {
        self.include_deleted = true;
        self
    }

    pub fn matches(&self, doc: &Document) -> bool {
        if !self.include_deleted && !doc.is_active() {
            return false;
        }
        if self.owner.as_ref().is_some_and(|o| o != &doc.owner_id) {
            return false;
        }
        if self.category.is_some_and(|c| c != doc.category) {
            return false;
        }
        if let Some(t) = self.related_item_type {
            if doc.related_item.as_ref().map(|r| r.item_type) != Some(t) {
                return false;
            }
        }
        if let Some(id) = &self.related_item_id {
            if doc.related_item.as_ref().map(|r| &r.id) != Some(id) {
                return false;
            }
        }
        if !self.tags.is_empty() && self.tags.is_disjoint(&doc.tags) {
            return false;
        }
        if self.created_from.is_some_and(|from| doc.created_at < from) {
            return false;
        }
        if self.created_to.is_some_and(|to| doc.created_at > to) {
            return false;
        }
        match &self.text {
            Some(text) => {
                let needle = text.trim().to_lowercase();
                [Some(&doc.title), doc.description.as_ref(), Some(&doc.file_name)]
                    .into_iter()
                    .flatten()
                    .any(|field| field.to_lowercase().contains(&needle))
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{owner, sample_document};
    use chrono::Duration;
    use dossier_types::DocumentStatus;

    #[test]
    fn empty_query_matches_active_documents_only() {
        let (mut doc, _) = sample_document(&owner("alice"));
        assert!(DocumentQuery::new().matches(&doc));
        doc.status = DocumentStatus::Deleted;
        assert!(!DocumentQuery::new().matches(&doc));
        assert!(DocumentQuery::new().including_deleted().matches(&doc));
    }

    #[test]
    fn text_search_is_case_insensitive_across_fields() {
        let (doc, _) = sample_document(&owner("alice"));
        assert!(DocumentQuery::new().matching("GRANT").matches(&doc));
        assert!(DocumentQuery::new().matching("national fund").matches(&doc));
        assert!(DocumentQuery::new().matching("proposal.PDF").matches(&doc));
        assert!(!DocumentQuery::new().matching("patent").matches(&doc));
        assert!(DocumentQuery::new().matching("   ").matches(&doc));
    }

    #[test]
    fn structured_filters() {
        let (doc, _) = sample_document(&owner("alice"));
        let project = doc.related_item.clone().unwrap();

        assert!(DocumentQuery::new().owned_by(owner("alice")).matches(&doc));
        assert!(!DocumentQuery::new().owned_by(owner("bob")).matches(&doc));
        assert!(DocumentQuery::new().in_category(Category::Research).matches(&doc));
        assert!(!DocumentQuery::new().in_category(Category::Publication).matches(&doc));
        assert!(DocumentQuery::new().related_to(&project).matches(&doc));
        assert!(!DocumentQuery::new()
            .related_to(&RelatedItem::new(RelatedItemType::ResearchProject, "rp-18"))
            .matches(&doc));
    }

    #[test]
    fn tags_match_any_of() {
        let (doc, _) = sample_document(&owner("alice"));
        assert!(DocumentQuery::new().with_tags(["grant", "missing"]).matches(&doc));
        assert!(!DocumentQuery::new().with_tags(["missing"]).matches(&doc));
    }

    #[test]
    fn date_range_is_inclusive() {
        let (doc, _) = sample_document(&owner("alice"));
        let at = doc.created_at;
        assert!(DocumentQuery::new().created_between(Some(at), Some(at)).matches(&doc));
        assert!(!DocumentQuery::new()
            .created_between(Some(at + Duration::seconds(1)), None)
            .matches(&doc));
        assert!(!DocumentQuery::new()
            .created_between(None, Some(at - Duration::seconds(1)))
            .matches(&doc));
    }
}
