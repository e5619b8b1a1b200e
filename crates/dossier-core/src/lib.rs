//! Upload pipeline for the dossier document store.
//!
//! An upload moves through three phases, each owned by a different crate:
//!
//! 1. **Stage** (`dossier-staging`): validate and write to local disk.
//! 2. **Commit** ([`Committer`]): push the staged file to the object store
//!    under a generated key, issue a download URL, remove the staging file.
//! 3. **Record** (`dossier-catalog`): allocate the version number and update
//!    the document projection.
//!
//! The catalog is written only after the store acknowledged the object, so
//! the catalog is never ahead of the store. The reverse gap (object stored,
//! catalog write failed) is logged under the `dossier::orphan` target and
//! closed by [`reconcile_orphans`].
//!
//! [`DocumentService`] ties the phases together and is the only type the HTTP
//! layer talks to. Every failure leaves it as a [`ServiceError`] carrying a
//! wire-level [`ErrorType`](dossier_types::ErrorType).

pub mod bucket;
pub mod committer;
pub mod error;
pub mod outcome;
pub mod reconcile;
pub mod retrieval;
pub mod service;

pub use bucket::BucketGuard;
pub use committer::{CommitPolicy, CommitReceipt, CommitTarget, Committer};
pub use error::{ServiceError, ServiceResult};
pub use outcome::{FailureResponse, PresignedUrl, PurgeReport, UploadMetadata, UploadResponse};
pub use reconcile::{reconcile_orphans, ReconcileOptions, ReconcileReport};
pub use retrieval::{download_name, RetrievalService};
pub use service::{DocumentService, RevisionRequest, UploadRequest};

/// Log target for objects that exist in the store without a catalog entry.
pub const ORPHAN_TARGET: &str = "dossier::orphan";
