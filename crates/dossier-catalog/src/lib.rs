//! Document catalog for the dossier document store.
//!
//! The catalog records which documents exist, who owns them, and the
//! append-only chain of versions behind each one. Object bytes never pass
//! through here; only their keys do.
//!
//! # Architecture
//!
//! - [`CatalogStore`] is the persistence seam. [`SqliteCatalog`] is the
//!   production backend; [`InMemoryCatalog`] is a test double behind the same
//!   trait.
//! - [`DocumentRegistry`] layers owner scoping, filtering, and the soft/hard
//!   delete lifecycle on top of a store.
//! - [`VersionChainManager`] allocates version numbers with a compare-and-swap
//!   on `current_version_number`, retrying on conflict, so concurrent uploads
//!   to one document always produce the contiguous sequence `1..=N`.
//!
//! # Invariants
//!
//! 1. Version numbers of a document are exactly `1..=N`.
//! 2. Version records are never updated.
//! 3. A document's mirrored file fields always equal its highest version's.

pub mod chain;
pub mod error;
pub mod memory;
pub mod query;
pub mod registry;
pub mod sqlite;
pub mod traits;

pub use chain::VersionChainManager;
pub use error::{CatalogError, CatalogResult};
pub use memory::InMemoryCatalog;
pub use query::DocumentQuery;
pub use registry::{DocumentDraft, DocumentRegistry};
pub use sqlite::SqliteCatalog;
pub use traits::CatalogStore;

#[cfg(test)]
pub(crate) mod testing;
