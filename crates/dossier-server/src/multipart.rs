use std::collections::{BTreeSet, HashMap};

use axum::extract::Multipart;
use tracing::warn;

use dossier_catalog::DocumentDraft;
use dossier_core::{RevisionRequest, ServiceError, UploadRequest};
use dossier_staging::{Stager, StagingHandle};
use dossier_types::{Category, CategoryMetadata, OwnerId, RelatedItem, ValidationError};

use crate::error::{ServerError, ServerResult};

const FILE_FIELD: &str = "file";

/// Text fields of an upload form.
#[derive(Clone, Debug, Default)]
pub struct FormFields(HashMap<String, String>);

impl FormFields {
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Trimmed value; blank counts as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    fn change_description(&self) -> Option<String> {
        self.get("changeDescription").map(str::to_string)
    }

    /// Validated draft of a new document owned by `owner`.
    pub fn draft(&self, owner: OwnerId) -> Result<DocumentDraft, ValidationError> {
        let category: Category = self
            .get("category")
            .ok_or(ValidationError::MissingField("category"))?
            .parse()?;
        let title = self
            .get("title")
            .ok_or(ValidationError::MissingField("title"))?
            .to_string();
        let tags = match self.get("tags") {
            Some(raw) => parse_tags(raw)?,
            None => BTreeSet::new(),
        };
        let metadata = match self.get("metadata") {
            Some(raw) => CategoryMetadata::parse_for(category, raw)?,
            None => CategoryMetadata::empty(category),
        };
        let related_item =
            RelatedItem::from_parts(category, self.get("relatedItemType"), self.get("relatedItemId"))?;

        let draft = DocumentDraft {
            owner,
            category,
            title,
            description: self.get("description").map(str::to_string),
            tags,
            metadata,
            related_item,
        };
        draft.validate()?;
        Ok(draft)
    }
}

/// A parsed upload form: the staged file plus every text field.
///
/// The file part is streamed straight into staging; it is never buffered in
/// memory. Text fields sent before the file part are taken as the complete
/// set and checked before staging starts, so a bad form costs no disk I/O.
/// If the form turns out to be unusable later, the staged file is discarded
/// before the error is returned.
#[derive(Debug)]
pub struct UploadForm {
    staged: StagingHandle,
    fields: FormFields,
}

impl UploadForm {
    /// Read a new-document form for `owner`.
    pub async fn read_upload(
        stager: &Stager,
        multipart: Multipart,
        owner: OwnerId,
    ) -> ServerResult<(UploadRequest, StagingHandle)> {
        let form = Self::read(stager, multipart, |fields| {
            fields.draft(owner.clone()).map(|_| ())
        })
        .await?;
        match form.fields.draft(owner) {
            Ok(draft) => Ok((
                UploadRequest {
                    draft,
                    change_description: form.fields.change_description(),
                },
                form.staged,
            )),
            Err(e) => {
                discard(&form.staged).await;
                Err(e.into())
            }
        }
    }

    /// Read a revision form: the file and an optional change note.
    pub async fn read_revision(
        stager: &Stager,
        multipart: Multipart,
    ) -> ServerResult<(RevisionRequest, StagingHandle)> {
        let form = Self::read(stager, multipart, |_| Ok(())).await?;
        let request = RevisionRequest {
            change_description: form.fields.change_description(),
        };
        Ok((request, form.staged))
    }

    /// Stream the form. `precheck` runs on the text fields seen so far when
    /// the file part arrives, but only if at least one arrived before it.
    pub async fn read<F>(stager: &Stager, mut multipart: Multipart, precheck: F) -> ServerResult<Self>
    where
        F: Fn(&FormFields) -> Result<(), ValidationError>,
    {
        let mut staged: Option<StagingHandle> = None;
        let mut fields = FormFields::default();

        let outcome = async {
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|e| ServerError::Multipart(e.to_string()))?
            {
                let name = field.name().unwrap_or_default().to_string();
                if name == FILE_FIELD {
                    if staged.is_some() {
                        return Err(ValidationError::invalid("file", "only one file per upload").into());
                    }
                    if !fields.is_empty() {
                        precheck(&fields)?;
                    }
                    let file_name = field
                        .file_name()
                        .map(str::to_string)
                        .ok_or(ValidationError::NoFile)?;
                    let mime = field.content_type().map(str::to_string);
                    let handle = stager
                        .stage_stream(&file_name, mime.as_deref(), Box::pin(field))
                        .await
                        .map_err(ServiceError::from)?;
                    staged = Some(handle);
                } else {
                    let value = field
                        .text()
                        .await
                        .map_err(|e| ServerError::Multipart(e.to_string()))?;
                    fields.insert(name, value);
                }
            }
            Ok::<_, ServerError>(())
        }
        .await;

        match (outcome, staged) {
            (Ok(()), Some(staged)) => Ok(Self { staged, fields }),
            (Ok(()), None) => Err(ValidationError::NoFile.into()),
            (Err(e), staged) => {
                if let Some(staged) = staged {
                    discard(&staged).await;
                }
                Err(e)
            }
        }
    }

    pub fn staged(&self) -> &StagingHandle {
        &self.staged
    }

    pub fn fields(&self) -> &FormFields {
        &self.fields
    }
}

/// Tags arrive as a JSON array of strings. Blank entries are dropped.
pub fn parse_tags(raw: &str) -> Result<BTreeSet<String>, ValidationError> {
    let tags: Vec<String> = serde_json::from_str(raw)
        .map_err(|e| ValidationError::invalid("tags", format!("expected a JSON array of strings: {e}")))?;
    Ok(tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect())
}

async fn discard(staged: &StagingHandle) {
    if let Err(e) = staged.discard().await {
        warn!(staging_id = %staged.id, error = %e, "failed to discard staged upload");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dossier_types::RelatedItemType;

    fn owner() -> OwnerId {
        OwnerId::new("lecturer-1").unwrap()
    }

    fn fields(pairs: &[(&str, &str)]) -> FormFields {
        let mut fields = FormFields::default();
        for (k, v) in pairs {
            fields.insert(*k, *v);
        }
        fields
    }

    #[test]
    fn tags_parse_from_json_array() {
        let tags = parse_tags(r#"["grant", " 2024 ", "", "grant"]"#).unwrap();
        assert_eq!(tags.into_iter().collect::<Vec<_>>(), vec!["2024", "grant"]);
    }

    #[test]
    fn tags_must_be_an_array_of_strings() {
        for raw in ["grant,2024", r#"{"a":1}"#, "[1, 2]"] {
            let err = parse_tags(raw).unwrap_err();
            assert!(matches!(err, ValidationError::InvalidField { field: "tags", .. }), "{raw}");
        }
    }

    #[test]
    fn draft_from_fields() {
        let draft = fields(&[
            ("title", " Research proposal "),
            ("category", "research"),
            ("relatedItemId", "RP-001"),
            ("description", ""),
        ])
        .draft(owner())
        .unwrap();
        assert_eq!(draft.title, "Research proposal");
        assert_eq!(draft.category, Category::Research);
        assert!(draft.description.is_none());
        assert_eq!(
            draft.related_item,
            Some(RelatedItem::new(RelatedItemType::ResearchProject, "RP-001"))
        );
    }

    #[test]
    fn draft_requires_title_and_category() {
        let err = fields(&[("category", "research")]).draft(owner()).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("title"));
        let err = fields(&[("title", "T")]).draft(owner()).unwrap_err();
        assert_eq!(err, ValidationError::MissingField("category"));
    }
}
