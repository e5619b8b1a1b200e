//! Local upload staging for the dossier document store.
//!
//! Uploads land on local disk before they are committed to the object store.
//! This crate owns that first phase and its clean-up:
//!
//! - [`Stager`] validates size and type before touching disk, then writes the
//!   bytes to a uniquely named file and hands back a [`StagingHandle`].
//! - [`CleanupSweep`] periodically removes staging files that were never
//!   committed (crashed or abandoned uploads).
//!
//! # Design Rules
//!
//! 1. Validation (`NoFile`, `TooLarge`, `DisallowedType`) happens before any I/O.
//! 2. Staging names are `stg-{millis}-{uuid}`: unique by construction, no lock.
//! 3. A staged file is removed by commit, by explicit discard, or by the sweep.
//! 4. A dropped or failed streaming write never leaves a partial file behind.

pub mod error;
pub mod stager;
pub mod sweep;

pub use error::{StagingError, StagingResult};
pub use stager::{resolve_mime_type, Stager, StagingConfig, StagingHandle, DEFAULT_MAX_UPLOAD_BYTES};
pub use sweep::{CleanupSweep, SweepConfig, SweepReport};

/// Filename prefix of every staging file. The sweep ignores anything else.
pub const STAGING_PREFIX: &str = "stg-";
