//! Provisioning pipeline for the Oracle → MariaDB migration.
//!
//! Each provisioner owns one slice of the chain (network, compute, managed
//! database, replication) and talks to the cloud only through the
//! `dbferry-cloud` traits. The [`orchestrator::MigrationOrchestrator`]
//! sequences the provisioners, threading identifiers through the append-only
//! [`dbferry_core::ProvisioningContext`].

pub mod compute;
pub mod database;
pub mod deploy;
pub mod error;
pub mod network;
pub mod orchestrator;
pub mod replication;
pub mod schema;

#[cfg(test)]
pub(crate) mod fakes;

pub use compute::{ComputeConfig, ComputeProvisioner, WorkloadProfile};
pub use database::{DatabaseConfig, DatabaseProvisioner};
pub use deploy::Deployer;
pub use error::{ProvisionError, Result};
pub use network::{NetworkConfig, NetworkProvisioner};
pub use orchestrator::MigrationOrchestrator;
pub use replication::{ReplicationConfig, ReplicationProvisioner};
pub use schema::{ConversionCounts, MigrationConfig, MigrationRunner, MigrationSummary};

use dbferry_cloud::ResourceHandle;

/// Outcome of one pipeline phase.
#[derive(Debug)]
pub enum StepResult {
    /// The phase ran and created these resources.
    Success(Vec<ResourceHandle>),
    /// The phase was not needed (e.g. a migration target was already known).
    Skipped(String),
    /// The phase failed; the pipeline aborts.
    Failed(ProvisionError),
}

impl StepResult {
    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success(_))
    }

    pub fn handles(&self) -> &[ResourceHandle] {
        match self {
            StepResult::Success(handles) => handles,
            _ => &[],
        }
    }
}

/// Parse a boolean configuration value; properties files carry `true/false`
/// and the original tooling also accepted `yes/no`.
pub(crate) fn parse_flag(value: &str, what: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" => Ok(true),
        "false" | "no" => Ok(false),
        other => Err(ProvisionError::Validation(format!(
            "{what} must be a boolean, got '{other}'"
        ))),
    }
}

/// Parse a numeric configuration value.
pub(crate) fn parse_number(value: &str, what: &str) -> Result<i32> {
    value.trim().parse().map_err(|_| {
        ProvisionError::Validation(format!("{what} must be a number, got '{value}'"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_both_spellings() {
        assert!(parse_flag("yes", "MultiAZ").unwrap());
        assert!(parse_flag("TRUE", "MultiAZ").unwrap());
        assert!(!parse_flag("no", "MultiAZ").unwrap());
        assert!(parse_flag("2", "MultiAZ").is_err());
    }

    #[test]
    fn numbers_reject_garbage() {
        assert_eq!(parse_number("200", "Allocated storage").unwrap(), 200);
        assert!(parse_number("lots", "Allocated storage").is_err());
    }
}
