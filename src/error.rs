//! Error taxonomy surfaced by catalog reads and actions.
use thiserror::Error;

use crate::storage::StorageError;

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum CatalogError {
    /// Malformed or missing field in a mutation payload or query options.
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },
    #[error("photo {0} not found")]
    NotFound(String),
    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl CatalogError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        CatalogError::Validation {
            field,
            message: message.into(),
        }
    }

    /// Field name for validation failures, so forms can attach the message.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            CatalogError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}
