//! Adapter Error Types
//!
//! This module defines the error type shared by every `DatabaseAdapter`
//! implementation.
//!
//! # Taxonomy
//!
//! - **Not-found on reads** never appears here: read paths return `None`/`false`
//! - **Storage failures** (`Libsql`, `Surreal`, `Serialization`, `PartialBatch`)
//!   are propagated unchanged, never retried
//! - **Contract violations** (`UnknownOperator`, `InvalidField`,
//!   `InvalidCollection`, `TransactionClosed`, `Unsupported`) fail loudly
//!   with a typed error instead of degrading silently

use thiserror::Error;

/// Result alias for adapter operations
pub type AdapterResult<T> = Result<T, AdapterError>;

#[derive(Error, Debug)]
pub enum AdapterError {
    /// libsql (relational backend) operation error
    #[error("Relational store operation failed: {0}")]
    Libsql(#[from] libsql::Error),

    /// SurrealDB (document backend) operation error
    #[error("Document store operation failed: {0}")]
    Surreal(#[from] surrealdb::Error),

    /// Record payload could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while preparing a database location
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A write targeted a record that does not exist
    #[error("Record not found in {collection}: {id}")]
    RecordNotFound { collection: String, id: String },

    /// Operator string outside the seven supported comparators
    #[error("Unknown comparison operator: {0}")]
    UnknownOperator(String),

    /// Field path is not a dotted identifier
    #[error("Invalid field path: {0}")]
    InvalidField(String),

    /// Collection name is not an identifier
    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    /// The backend cannot honour part of the contract
    #[error("{backend} does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: String,
    },

    /// A transaction handle was used after its callback returned
    #[error("Transaction handle used outside its callback")]
    TransactionClosed,

    /// Optimistic concurrency check failed at commit
    #[error("Transaction conflict: {0}")]
    TransactionConflict(String),

    /// The transaction callback requested an abort
    #[error("Transaction aborted: {0}")]
    Aborted(String),

    /// A non-atomic batch failed part way; `committed` lists ids already written
    #[error("Batch failed after committing {} record(s): {source}", committed.len())]
    PartialBatch {
        committed: Vec<String>,
        #[source]
        source: Box<AdapterError>,
    },

    /// Operation issued while the adapter is disconnected
    #[error("Adapter is not connected")]
    NotConnected,

    /// Deployment configuration is missing or invalid
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Malformed row/document returned by the backend
    #[error("Corrupt record in {collection}: {context}")]
    CorruptRecord { collection: String, context: String },
}

impl AdapterError {
    pub fn record_not_found(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self::RecordNotFound {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn unsupported(backend: &'static str, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            backend,
            operation: operation.into(),
        }
    }

    /// Abort the surrounding transaction with a caller-visible reason
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn corrupt_record(collection: impl Into<String>, context: impl Into<String>) -> Self {
        Self::CorruptRecord {
            collection: collection.into(),
            context: context.into(),
        }
    }

    pub fn partial_batch(committed: Vec<String>, source: AdapterError) -> Self {
        Self::PartialBatch {
            committed,
            source: Box::new(source),
        }
    }
}
