//! Result and error types for the core library

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Core library error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(String),

    /// A lookup by id found nothing (unknown rule, unknown reference)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed input, rejected before any write
    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    /// Resolution query missing a mandatory anchor
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Write would make resolution ambiguous
    #[error("Conflict with rule {existing}: {message}")]
    Conflict { existing: Uuid, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a database error
    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error naming the offending field
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create an invalid query error
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    /// Create a conflict error pointing at the colliding rule
    pub fn conflict(existing: Uuid, msg: impl Into<String>) -> Self {
        Self::Conflict {
            existing,
            message: msg.into(),
        }
    }

    /// Offending field for validation errors
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, Error>;

/// Operation result with optional context (for JSON output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub context: Option<HashMap<String, serde_json::Value>>,
}

impl<T> OperationResult<T> {
    /// Create a successful result
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            context: None,
        }
    }

    /// Create a failed result
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: None,
        }
    }

    /// Create a failed result with context
    pub fn fail_with_context(
        error: impl Into<String>,
        context: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            context: Some(context),
        }
    }
}

impl<T> From<Result<T>> for OperationResult<T> {
    fn from(result: Result<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => {
                // Keep the machine-readable bits of typed errors next to the message
                let mut context = HashMap::new();
                match &e {
                    Error::Validation { field, .. } => {
                        context.insert("field".to_string(), serde_json::json!(field));
                    }
                    Error::Conflict { existing, .. } => {
                        context.insert("conflictsWith".to_string(), serde_json::json!(existing));
                    }
                    _ => {}
                }
                if context.is_empty() {
                    Self::fail(e.to_string())
                } else {
                    Self::fail_with_context(e.to_string(), context)
                }
            }
        }
    }
}
