//! Store error types

use thiserror::Error;

/// Errors that can occur while opening or operating on a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// An operation was issued before `open` completed
    #[error("store is not open")]
    NotOpen,

    /// `open` was called on a handle that already holds a connection
    #[error("store is already open")]
    AlreadyOpen,

    /// The host could not open the database (version conflict, permission denial, ...)
    #[error("open error: {0}")]
    Open(String),

    /// The schema upgrade hook failed and the version change was rolled back
    #[error("upgrade error: {0}")]
    Upgrade(String),

    /// Transaction could not be created or did not complete
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A write was attempted through a read-only accessor
    #[error("write attempted in a read-only transaction")]
    ReadOnly,

    /// Object store does not exist in the database
    #[error("unknown object store: {0}")]
    UnknownStore(String),

    /// Index does not exist on the object store
    #[error("unknown index: {0}")]
    UnknownIndex(String),

    /// Record cannot be cloned into a host value
    #[error("record could not be cloned: {0}")]
    DataClone(String),

    /// A value could not be used as a key
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Duplicate primary key or unique index violation
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Any other failure reported by a host request
    #[error("request error: {0}")]
    Request(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
