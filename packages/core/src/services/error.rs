//! Service Layer Error Types
//!
//! One tagged error covers the whole taxonomy; the boundary adapters render
//! variants to HTTP status codes or TCP reply bytes in a single place, so
//! services never reason about transport codes.

use thiserror::Error;

use crate::codec::CodecError;
use crate::db::StoreError;
use crate::schema::InvalidSchema;

/// Service operation errors.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Short read, bad checksum or otherwise broken framing
    #[error("Transmission error: {0}")]
    Transmission(String),

    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),

    /// Bad credentials or unknown session
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The caller's role or capability set denies the operation
    #[error("Not enough rights: {0}")]
    NotEnoughRights(String),

    /// A schema document violates the invariants
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Malformed body, link header or parameter
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A referenced entity or row does not exist
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// An inserted primary key already exists
    #[error("Duplicated entity: {0}")]
    DuplicatedEntity(String),

    /// Incoming row data fails attribute validation
    #[error("Invalid income data: {0}")]
    NotValidIncomeData(String),

    /// Operation tag unknown or not allowed by the transaction definition
    #[error("Invalid operation: {0}")]
    NotValidOperation(String),

    /// The named transaction is not part of the schema
    #[error("Unknown transaction definition: {0}")]
    EntityDefinition(String),

    /// A pre or post script rejected the header
    #[error("User validation failed: {0}")]
    UserValidation(String),

    /// Key-value store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// A context or resource with this identity already exists
    #[error("{0}")]
    AlreadyExists(String),

    /// The referenced context or resource does not exist
    #[error("{0}")]
    NotExists(String),
}

impl ServiceError {
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn not_enough_rights(msg: impl Into<String>) -> Self {
        Self::NotEnoughRights(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn entity_not_found(msg: impl Into<String>) -> Self {
        Self::EntityNotFound(msg.into())
    }

    pub fn not_valid_income_data(msg: impl Into<String>) -> Self {
        Self::NotValidIncomeData(msg.into())
    }

    pub fn user_validation(msg: impl Into<String>) -> Self {
        Self::UserValidation(msg.into())
    }

    pub fn not_exists(msg: impl Into<String>) -> Self {
        Self::NotExists(msg.into())
    }
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::AlreadyExists(what) => {
                Self::AlreadyExists(format!("Context with uuid: {} already exists.", what))
            }
            StoreError::NotExists(what) => Self::NotExists(format!("Context {} doesn't exist.", what)),
            other => Self::Storage(other.to_string()),
        }
    }
}

impl From<InvalidSchema> for ServiceError {
    fn from(error: InvalidSchema) -> Self {
        Self::InvalidSchema(error.to_string())
    }
}

impl From<CodecError> for ServiceError {
    fn from(error: CodecError) -> Self {
        Self::NotValidIncomeData(error.to_string())
    }
}
