//! Error types for the document workflow core.

use crate::types::{DocName, Notice};
use thiserror::Error;

/// Main error type for workflow operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document not found: {0}")]
    DocumentNotFound(DocName),

    #[error("Cannot create a version from {source_doc}: {reason}")]
    Conflict { source_doc: DocName, reason: String },

    #[error("Cannot create version: original reference not set on {0}")]
    MissingOriginalReference(DocName),

    #[error("Version {0} already exists")]
    VersionExists(DocName),

    #[error("Unreserve is allowed only for submitted documents: {0}")]
    NotSubmitted(DocName),

    #[error("Row #{row}: Please select Warehouse")]
    WarehouseRequired { row: usize },

    #[error("Row #{row}: Reserved qty must be greater than 0 for batch {batch}")]
    InvalidQuantity { row: usize, batch: String },

    #[error(
        "Cannot reserve {requested} qty for batch {batch} in warehouse {warehouse}. \
         Available to reserve: {available} (Current stock: {current}, Already reserved: {reserved})"
    )]
    InsufficientBatchQty {
        batch: String,
        warehouse: String,
        requested: f64,
        available: f64,
        current: f64,
        reserved: f64,
    },

    #[error("Row not found: {0}")]
    RowNotFound(u64),

    #[error("Collaborator error: {0}")]
    Collaborator(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl CoreError {
    /// Render the error as a user-facing notice.
    ///
    /// Collaborator failures are passed through verbatim.
    pub fn to_notice(&self) -> Notice {
        match self {
            CoreError::Collaborator(message) => Notice::error(message.clone()),
            other => Notice::error(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<csv::Error> for CoreError {
    fn from(e: csv::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for CoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

/// Result type for workflow operations.
pub type Result<T> = std::result::Result<T, CoreError>;
