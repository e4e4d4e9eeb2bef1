//! Cloud provider error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("{operation} failed: {message}")]
    Api { operation: String, message: String },

    #[error("ingress rule already exists on security group {0}")]
    DuplicateRule(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("malformed provider response: {0}")]
    InvalidResponse(String),

    #[error("HTTP request failed: {0}")]
    Http(String),
}

impl CloudError {
    pub fn api(operation: impl Into<String>, err: impl std::fmt::Display) -> Self {
        CloudError::Api {
            operation: operation.into(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CloudError>;
