//! Core error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{0} must be specified")]
    MissingParameter(String),

    #[error("context key '{0}' is already set")]
    ContextOverwrite(String),

    #[error("context key '{key}' holds a {found}, expected {expected}")]
    ContextType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("invalid poll policy: {0}")]
    InvalidPollPolicy(String),

    #[error("invalid properties file: {0}")]
    InvalidProperties(String),

    #[error("resource not found: {0}")]
    ResourceNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
