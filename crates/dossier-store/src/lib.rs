//! Object-store boundary for the dossier document store.
//!
//! Document bytes live in an S3-compatible bucket under opaque generated keys.
//! This crate is the only place that talks to that bucket.
//!
//! # Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`S3ObjectStore`] -- `aws-sdk-s3` client for MinIO / S3 endpoints
//! - [`InMemoryObjectStore`] -- `HashMap`-based double with fault injection
//!
//! # Design Rules
//!
//! 1. Client construction never performs I/O; bucket checks are explicit.
//! 2. Every failure is classified into the commit taxonomy
//!    (connection, auth, bucket, unknown) at this boundary.
//! 3. Presigning is side-effect free and safe to call concurrently.

pub mod config;
pub mod error;
pub mod memory;
pub mod s3;
pub mod traits;

pub use config::ObjectStoreConfig;
pub use error::{StoreError, StoreResult};
pub use memory::{Fault, InMemoryObjectStore};
pub use s3::S3ObjectStore;
pub use traits::{ObjectInfo, ObjectMetadata, ObjectStore};
