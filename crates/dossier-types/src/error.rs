use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by type parsing and construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    #[error("unknown related item type: {0}")]
    UnknownRelatedItemType(String),

    #[error("invalid content hash: {0}")]
    InvalidHash(String),

    #[error("owner id must not be empty")]
    EmptyOwner,
}

/// User-correctable rejection of an upload, raised before any I/O happens.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no file was supplied")]
    NoFile,

    #[error("file is {size} bytes, limit is {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    #[error("file type {0} is not allowed")]
    DisallowedType(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl ValidationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

impl From<TypeError> for ValidationError {
    fn from(err: TypeError) -> Self {
        let field = match &err {
            TypeError::InvalidId(_) => "id",
            TypeError::UnknownCategory(_) => "category",
            TypeError::UnknownRelatedItemType(_) => "relatedItemType",
            TypeError::InvalidHash(_) => "contentHash",
            TypeError::EmptyOwner => "ownerId",
        };
        Self::invalid(field, err.to_string())
    }
}

/// Machine-readable failure kind carried by every failure response.
///
/// `ConnectionError` and `UnknownError` are retryable by the caller;
/// `AuthError` and `BucketError` need an operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    ProcessingError,
    ConnectionError,
    AuthError,
    BucketError,
    UnknownError,
}

impl ErrorType {
    /// Whether a caller may retry the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectionError | Self::UnknownError)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProcessingError => "PROCESSING_ERROR",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::AuthError => "AUTH_ERROR",
            Self::BucketError => "BUCKET_ERROR",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
