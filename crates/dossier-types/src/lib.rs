//! Foundation types for the dossier document store.
//!
//! This crate provides the identity, classification, and record types shared
//! by every other dossier crate. Every other dossier crate depends on
//! `dossier-types`.
//!
//! # Key Types
//!
//! - [`DocumentId`] / [`VersionId`]: UUID v7 identifiers (time-ordered)
//! - [`OwnerId`]: caller identity supplied by the authentication layer
//! - [`ObjectKey`]: opaque, collision-resistant object-store key
//! - [`Category`]: accreditation category a document is filed under
//! - [`RelatedItem`]: typed reference to the record a document is attached to
//! - [`CategoryMetadata`]: per-category metadata, tagged by category
//! - [`Document`] / [`Version`]: catalog projection and immutable version record
//! - [`ErrorType`]: machine-readable failure kind returned across the boundary

pub mod category;
pub mod document;
pub mod error;
pub mod ids;
pub mod metadata;
pub mod object;

pub use category::{Category, RelatedItem, RelatedItemType};
pub use document::{Document, DocumentStatus, NewVersion, Version};
pub use error::{ErrorType, TypeError, ValidationError};
pub use ids::{DocumentId, OwnerId, VersionId};
pub use metadata::CategoryMetadata;
pub use object::{ContentHash, ObjectKey};
