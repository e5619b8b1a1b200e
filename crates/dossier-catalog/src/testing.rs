//! Fixtures shared by the catalog's unit tests.

use chrono::Utc;

use dossier_types::{
    Category, CategoryMetadata, ContentHash, Document, DocumentId, NewVersion, ObjectKey, OwnerId,
    RelatedItem, RelatedItemType, Version,
};

use crate::registry::DocumentDraft;

pub(crate) fn owner(name: &str) -> OwnerId {
    OwnerId::new(name).unwrap()
}

pub(crate) fn new_version(owner: &OwnerId, category: Category, name: &str) -> NewVersion {
    NewVersion {
        file_name: name.into(),
        file_size: name.len() as u64,
        mime_type: "application/pdf".into(),
        storage_key: ObjectKey::generate(category),
        content_hash: ContentHash::of(name.as_bytes()),
        change_description: "upload".into(),
        created_by: owner.clone(),
    }
}

pub(crate) fn draft(owner: &OwnerId, category: Category, title: &str) -> DocumentDraft {
    DocumentDraft {
        owner: owner.clone(),
        category,
        title: title.into(),
        description: None,
        tags: Default::default(),
        metadata: CategoryMetadata::empty(category),
        related_item: None,
    }
}

/// A research document with tags and a related project, plus its first version.
pub(crate) fn sample_document(owner: &OwnerId) -> (Document, Version) {
    let id = DocumentId::new();
    let first = new_version(owner, Category::Research, "proposal.pdf").into_version(id, 1, Utc::now());
    let mut draft = draft(owner, Category::Research, "Grant proposal");
    draft.description = Some("Submitted to the national fund".into());
    draft.tags = ["grant".to_string(), "2024".to_string()].into_iter().collect();
    draft.related_item = Some(RelatedItem::new(RelatedItemType::ResearchProject, "rp-17"));
    (draft.into_document(id, &first), first)
}

/// Next upload for `doc`, made by its owner.
pub(crate) fn first_version_of(doc: &Document, name: &str) -> NewVersion {
    new_version(&doc.owner_id, doc.category, name)
}
