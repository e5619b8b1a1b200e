use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::debug;

use dossier_types::{
    Category, CategoryMetadata, ContentHash, Document, DocumentId, DocumentStatus, ObjectKey,
    OwnerId, RelatedItem, Version, VersionId,
};

use crate::error::{CatalogError, CatalogResult};
use crate::traits::CatalogStore;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id                     TEXT PRIMARY KEY,
    owner_id               TEXT NOT NULL,
    category               TEXT NOT NULL,
    title                  TEXT NOT NULL,
    description            TEXT,
    tags                   TEXT NOT NULL,
    metadata               TEXT NOT NULL,
    current_version_number INTEGER NOT NULL CHECK (current_version_number > 0),
    file_name              TEXT NOT NULL,
    file_size              INTEGER NOT NULL,
    file_type              TEXT NOT NULL,
    storage_key            TEXT NOT NULL,
    related_item_type      TEXT,
    related_item_id        TEXT,
    status                 TEXT NOT NULL,
    created_at             TEXT NOT NULL,
    updated_at             TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents (owner_id, status);
CREATE INDEX IF NOT EXISTS idx_documents_related ON documents (related_item_type, related_item_id);

CREATE TABLE IF NOT EXISTS document_versions (
    id                 TEXT PRIMARY KEY,
    document_id        TEXT NOT NULL REFERENCES documents (id) ON DELETE CASCADE,
    version_number     INTEGER NOT NULL CHECK (version_number > 0),
    file_name          TEXT NOT NULL,
    file_size          INTEGER NOT NULL,
    mime_type          TEXT NOT NULL,
    storage_key        TEXT NOT NULL,
    content_hash       TEXT NOT NULL,
    change_description TEXT NOT NULL,
    created_by         TEXT NOT NULL,
    created_at         TEXT NOT NULL,
    UNIQUE (document_id, version_number)
);
CREATE INDEX IF NOT EXISTS idx_versions_storage_key ON document_versions (storage_key);

CREATE TRIGGER IF NOT EXISTS document_versions_immutable
BEFORE UPDATE ON document_versions
BEGIN
    SELECT RAISE(ABORT, 'document versions are immutable');
END;
"#;

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    owner_id: String,
    category: String,
    title: String,
    description: Option<String>,
    tags: String,
    metadata: String,
    current_version_number: i64,
    file_name: String,
    file_size: i64,
    file_type: String,
    storage_key: String,
    related_item_type: Option<String>,
    related_item_id: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct VersionRow {
    id: String,
    document_id: String,
    version_number: i64,
    file_name: String,
    file_size: i64,
    mime_type: String,
    storage_key: String,
    content_hash: String,
    change_description: String,
    created_by: String,
    created_at: DateTime<Utc>,
}

fn corrupt(what: &str, e: impl std::fmt::Display) -> CatalogError {
    CatalogError::Corrupt(format!("{what}: {e}"))
}

impl TryFrom<DocumentRow> for Document {
    type Error = CatalogError;

    fn try_from(row: DocumentRow) -> CatalogResult<Self> {
        let category = Category::from_str(&row.category).map_err(|e| corrupt("category", e))?;
        let related_item = match (row.related_item_type, row.related_item_id) {
            (Some(t), Some(id)) => Some(RelatedItem::new(
                t.parse().map_err(|e| corrupt("related_item_type", e))?,
                id,
            )),
            _ => None,
        };
        let tags: BTreeSet<String> =
            serde_json::from_str(&row.tags).map_err(|e| corrupt("tags", e))?;
        let metadata: CategoryMetadata =
            serde_json::from_str(&row.metadata).map_err(|e| corrupt("metadata", e))?;
        Ok(Document {
            id: row.id.parse().map_err(|e| corrupt("id", e))?,
            owner_id: OwnerId::new(row.owner_id).map_err(|e| corrupt("owner_id", e))?,
            category,
            title: row.title,
            description: row.description,
            tags,
            metadata,
            current_version_number: u32::try_from(row.current_version_number)
                .map_err(|e| corrupt("current_version_number", e))?,
            file_name: row.file_name,
            file_size: u64::try_from(row.file_size).map_err(|e| corrupt("file_size", e))?,
            file_type: row.file_type,
            storage_key: ObjectKey::from_raw(row.storage_key),
            related_item,
            status: DocumentStatus::parse(&row.status)
                .ok_or_else(|| corrupt("status", &row.status))?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<VersionRow> for Version {
    type Error = CatalogError;

    fn try_from(row: VersionRow) -> CatalogResult<Self> {
        Ok(Version {
            id: VersionId::from_str(&row.id).map_err(|e| corrupt("id", e))?,
            document_id: row.document_id.parse().map_err(|e| corrupt("document_id", e))?,
            version_number: u32::try_from(row.version_number)
                .map_err(|e| corrupt("version_number", e))?,
            file_name: row.file_name,
            file_size: u64::try_from(row.file_size).map_err(|e| corrupt("file_size", e))?,
            mime_type: row.mime_type,
            storage_key: ObjectKey::from_raw(row.storage_key),
            content_hash: ContentHash::from_hex(&row.content_hash)
                .map_err(|e| corrupt("content_hash", e))?,
            change_description: row.change_description,
            created_by: OwnerId::new(row.created_by).map_err(|e| corrupt("created_by", e))?,
            created_at: row.created_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// SQLite-backed catalog.
///
/// The version CAS is a conditional `UPDATE ... WHERE current_version_number
/// = ?` inside a transaction, with `UNIQUE (document_id, version_number)` as
/// a second line of enforcement.
#[derive(Clone, Debug)]
pub struct SqliteCatalog {
    pool: Pool<Sqlite>,
}

impl SqliteCatalog {
    /// Open (creating if needed) a catalog at `url`, e.g.
    /// `sqlite:///var/lib/dossier/catalog.db` or `sqlite::memory:`.
    pub async fn connect(url: &str, max_connections: u32) -> CatalogResult<Self> {
        let in_memory = url.contains(":memory:");
        let mut opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));
        if !in_memory {
            opts = opts
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // Each connection to `:memory:` is a separate database.
        let mut pool = SqlitePoolOptions::new().max_connections(if in_memory {
            1
        } else {
            max_connections.max(1)
        });
        if in_memory {
            pool = pool.idle_timeout(None).max_lifetime(None);
        }
        let catalog = Self {
            pool: pool.connect_with(opts).await?,
        };
        catalog.migrate().await?;
        Ok(catalog)
    }

    /// Open a catalog file at `path`, creating parent directories.
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> CatalogResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| CatalogError::Storage(format!("create {}: {e}", parent.display())))?;
        }
        Self::connect(&format!("sqlite://{}?mode=rwc", path.display()), max_connections).await
    }

    /// A private in-memory database.
    pub async fn in_memory() -> CatalogResult<Self> {
        Self::connect("sqlite::memory:", 1).await
    }

    /// Create tables, indexes, and the immutability trigger.
    pub async fn migrate(&self) -> CatalogResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        debug!("catalog schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

async fn insert_version(
    conn: &mut sqlx::SqliteConnection,
    version: &Version,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO document_versions (id, document_id, version_number, file_name, file_size, \
         mime_type, storage_key, content_hash, change_description, created_by, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(version.id.to_string())
    .bind(version.document_id.to_string())
    .bind(i64::from(version.version_number))
    .bind(&version.file_name)
    .bind(version.file_size as i64)
    .bind(&version.mime_type)
    .bind(version.storage_key.as_str())
    .bind(version.content_hash.to_hex())
    .bind(&version.change_description)
    .bind(version.created_by.as_str())
    .bind(version.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn current_state(
    conn: &mut sqlx::SqliteConnection,
    id: DocumentId,
) -> Result<Option<(u32, String)>, sqlx::Error> {
    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT current_version_number, status FROM documents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(conn)
            .await?;
    Ok(row.map(|(n, status)| (n.max(0) as u32, status)))
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn insert_document(&self, document: &Document, first: &Version) -> CatalogResult<()> {
        let tags = serde_json::to_string(&document.tags).map_err(|e| corrupt("tags", e))?;
        let metadata =
            serde_json::to_string(&document.metadata).map_err(|e| corrupt("metadata", e))?;

        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO documents (id, owner_id, category, title, description, tags, metadata, \
             current_version_number, file_name, file_size, file_type, storage_key, \
             related_item_type, related_item_id, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(document.id.to_string())
        .bind(document.owner_id.as_str())
        .bind(document.category.as_str())
        .bind(&document.title)
        .bind(&document.description)
        .bind(tags)
        .bind(metadata)
        .bind(i64::from(document.current_version_number))
        .bind(&document.file_name)
        .bind(document.file_size as i64)
        .bind(&document.file_type)
        .bind(document.storage_key.as_str())
        .bind(document.related_item.as_ref().map(|r| r.item_type.as_str()))
        .bind(document.related_item.as_ref().map(|r| r.id.as_str()))
        .bind(document.status.as_str())
        .bind(document.created_at)
        .bind(document.updated_at)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                let actual = current_state(&mut *tx, document.id).await?.map(|(n, _)| n).unwrap_or(0);
                tx.rollback().await?;
                return Err(CatalogError::Conflict {
                    id: document.id,
                    expected: 0,
                    actual,
                });
            }
            Err(e) => return Err(e.into()),
        }
        insert_version(&mut *tx, first).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_document(&self, id: DocumentId) -> CatalogResult<Option<Document>> {
        sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?
            .map(Document::try_from)
            .transpose()
    }

    async fn append_version(
        &self,
        expected_current: u32,
        document: &Document,
        version: &Version,
    ) -> CatalogResult<()> {
        let mut tx = self.pool.begin().await?;
        let updated = sqlx::query(
            "UPDATE documents SET current_version_number = ?, file_name = ?, file_size = ?, \
             file_type = ?, storage_key = ?, updated_at = ? \
             WHERE id = ? AND current_version_number = ? AND status = ?",
        )
        .bind(i64::from(document.current_version_number))
        .bind(&document.file_name)
        .bind(document.file_size as i64)
        .bind(&document.file_type)
        .bind(document.storage_key.as_str())
        .bind(document.updated_at)
        .bind(document.id.to_string())
        .bind(i64::from(expected_current))
        .bind(DocumentStatus::Active.as_str())
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let current = current_state(&mut *tx, document.id).await?;
            tx.rollback().await?;
            return Err(match current {
                None => CatalogError::NotFound(document.id),
                Some((_, status)) if status != DocumentStatus::Active.as_str() => {
                    CatalogError::Deleted(document.id)
                }
                Some((actual, _)) => CatalogError::Conflict {
                    id: document.id,
                    expected: expected_current,
                    actual,
                },
            });
        }

        match insert_version(&mut *tx, version).await {
            Ok(()) => {}
            Err(e) if is_unique_violation(&e) => {
                tx.rollback().await?;
                return Err(CatalogError::Conflict {
                    id: document.id,
                    expected: expected_current,
                    actual: version.version_number,
                });
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit().await?;
        Ok(())
    }

    async fn set_status(
        &self,
        id: DocumentId,
        owner: &OwnerId,
        status: DocumentStatus,
        at: DateTime<Utc>,
    ) -> CatalogResult<bool> {
        let result = sqlx::query(
            "UPDATE documents SET status = ?, updated_at = ? WHERE id = ? AND owner_id = ?",
        )
        .bind(status.as_str())
        .bind(at)
        .bind(id.to_string())
        .bind(owner.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_document(
        &self,
        id: DocumentId,
        owner: &OwnerId,
    ) -> CatalogResult<Option<Vec<Version>>> {
        let mut tx = self.pool.begin().await?;
        let rows = sqlx::query_as::<_, VersionRow>(
            "SELECT * FROM document_versions WHERE document_id = ? ORDER BY version_number",
        )
        .bind(id.to_string())
        .fetch_all(&mut *tx)
        .await?;

        let deleted = sqlx::query("DELETE FROM documents WHERE id = ? AND owner_id = ?")
            .bind(id.to_string())
            .bind(owner.as_str())
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(None);
        }
        // Cascades only when foreign keys are enforced; delete explicitly.
        sqlx::query("DELETE FROM document_versions WHERE document_id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        rows.into_iter()
            .map(Version::try_from)
            .collect::<CatalogResult<Vec<_>>>()
            .map(Some)
    }

    async fn list_documents(&self, owner: Option<&OwnerId>) -> CatalogResult<Vec<Document>> {
        let rows = match owner {
            Some(owner) => {
                sqlx::query_as::<_, DocumentRow>(
                    "SELECT * FROM documents WHERE owner_id = ? ORDER BY created_at DESC",
                )
                .bind(owner.as_str())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, DocumentRow>("SELECT * FROM documents ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(Document::try_from).collect()
    }

    async fn list_versions(&self, id: DocumentId) -> CatalogResult<Vec<Version>> {
        sqlx::query_as::<_, VersionRow>(
            "SELECT * FROM document_versions WHERE document_id = ? ORDER BY version_number",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Version::try_from)
        .collect()
    }

    async fn get_version(&self, id: DocumentId, number: u32) -> CatalogResult<Option<Version>> {
        sqlx::query_as::<_, VersionRow>(
            "SELECT * FROM document_versions WHERE document_id = ? AND version_number = ?",
        )
        .bind(id.to_string())
        .bind(i64::from(number))
        .fetch_optional(&self.pool)
        .await?
        .map(Version::try_from)
        .transpose()
    }

    async fn referenced_keys(&self) -> CatalogResult<HashSet<ObjectKey>> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT DISTINCT storage_key FROM document_versions")
            .fetch_all(&self.pool)
            .await?;
        Ok(keys.into_iter().map(ObjectKey::from_raw).collect())
    }

    async fn is_key_referenced(&self, key: &ObjectKey) -> CatalogResult<bool> {
        let found: Option<i64> =
            sqlx::query_scalar("SELECT 1 FROM document_versions WHERE storage_key = ? LIMIT 1")
                .bind(key.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(found.is_some())
    }
}
