//! Pipeline error types.
//!
//! Almost everything here is fatal: the pipeline halts, previously created
//! cloud resources stay in place, and the operator cleans up manually. The
//! one tolerated failure is a degraded schema conversion, which downgrades
//! to warnings in [`crate::schema`].

use dbferry_cloud::CloudError;
use dbferry_core::CoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Cloud(#[from] CloudError),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("subprocess failed: {0}")]
    Subprocess(String),

    #[error("could not parse migration summary: {0}")]
    SummaryParse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;
