//! Error types for provisioning and rollback.

use bastion_cloud::CloudProviderError;
use thiserror::Error;

use crate::compensator::RollbackReport;
use crate::ledger::ResourceRecord;
use crate::state::ProvisionStep;

/// Invalid or missing input, detected before any provider call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("configuration error: {message}")]
pub struct ConfigurationError {
    message: String,
}

impl ConfigurationError {
    /// Create a configuration error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The message without the prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A provider call made during a provisioning step failed.
#[derive(Error, Debug)]
#[error("step {step} failed: {source}")]
pub struct ProvisioningStepError {
    /// Step that was running.
    pub step: ProvisionStep,
    /// Provider error that ended the step.
    #[source]
    pub source: CloudProviderError,
}

/// Tearing down a single recorded resource failed.
#[derive(Error, Debug)]
#[error("failed to tear down {record} after {attempts} attempt(s): {source}")]
pub struct CompensationStepError {
    /// Record whose teardown failed.
    pub record: ResourceRecord,
    /// Attempts made, retries included.
    pub attempts: u32,
    /// Last provider error.
    #[source]
    pub source: CloudProviderError,
}

/// Result of a provisioning run that did not complete.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Nothing was created.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A step failed and the run was rolled back.
    #[error("{failure}; rollback: {report}")]
    Step {
        failure: ProvisioningStepError,
        report: RollbackReport,
    },
}

impl ProvisionError {
    /// Rollback report, when the run got far enough to need one.
    #[must_use]
    pub fn rollback_report(&self) -> Option<&RollbackReport> {
        match self {
            Self::Configuration(_) => None,
            Self::Step { report, .. } => Some(report),
        }
    }
}
