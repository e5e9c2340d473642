//! Store Error Types

use thiserror::Error;

/// Errors from the transactional key-value store.
///
/// Business-level failures (missing documents, invalid payloads) are handled
/// by the service layer; these cover the store itself.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open the on-disk store
    #[error("Failed to open store at {path}: {source}")]
    OpenFailed {
        path: String,
        source: rocksdb::Error,
    },

    /// A context (column family) with this name already exists
    #[error("Context with uuid: {0} already exists.")]
    AlreadyExists(String),

    /// The named context (column family) does not exist
    #[error("Context {0} doesn't exist.")]
    NotExists(String),

    /// RocksDB operation error
    #[error("Storage operation failed: {0}")]
    Rocks(#[from] rocksdb::Error),

    /// Commit or rollback failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// A stored JSON document failed to (de)serialize
    #[error("Document error: {0}")]
    Document(#[from] serde_json::Error),
}

impl StoreError {
    pub fn open_failed(path: impl Into<String>, source: rocksdb::Error) -> Self {
        Self::OpenFailed {
            path: path.into(),
            source,
        }
    }

    pub fn transaction_failed(msg: impl Into<String>) -> Self {
        Self::TransactionFailed(msg.into())
    }
}
