//! Rollback of recorded resources.
//!
//! The compensator walks a ledger from the last record to the first and
//! tears each resource down. A failed teardown is recorded in the report
//! and the walk continues; nothing short of the end of the ledger stops it.
//! Automatic rollback after a failed step and manual rollback from the CLI
//! both go through [`Compensator::rollback`].

use std::fmt;
use std::sync::Arc;

use bastion_cloud::{CloudProviderError, InfraProvider};
use tracing::{error, info, warn};

use crate::error::CompensationStepError;
use crate::ledger::{ResourceLedger, ResourceRecord};
use crate::state::{with_retry_async, RetryConfig};

/// Outcome of one rollback pass, in teardown order.
#[derive(Debug, Default)]
pub struct RollbackReport {
    entries: Vec<Result<ResourceRecord, CompensationStepError>>,
}

impl RollbackReport {
    /// Per-record outcomes, last-created first.
    pub fn entries(&self) -> impl Iterator<Item = &Result<ResourceRecord, CompensationStepError>> {
        self.entries.iter()
    }

    /// Records in the order teardown was attempted.
    #[must_use]
    pub fn attempted(&self) -> Vec<&ResourceRecord> {
        self.entries
            .iter()
            .map(|entry| match entry {
                Ok(record) | Err(CompensationStepError { record, .. }) => record,
            })
            .collect()
    }

    /// Records that were torn down.
    pub fn deleted(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.entries.iter().filter_map(|entry| entry.as_ref().ok())
    }

    /// Teardowns that failed.
    pub fn failures(&self) -> impl Iterator<Item = &CompensationStepError> {
        self.entries.iter().filter_map(|entry| entry.as_ref().err())
    }

    /// Number of records processed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger was empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether every teardown succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Whether every failure only says the resource is already gone.
    #[must_use]
    pub fn only_missing_resources(&self) -> bool {
        self.failures().all(|failure| failure.source.is_not_found())
    }
}

impl fmt::Display for RollbackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.failures().count();
        write!(
            f,
            "{} of {} resource(s) removed, {failed} failed",
            self.len() - failed,
            self.len()
        )
    }
}

/// Teardown errors worth another attempt.
///
/// Dependency violations are included: a parent often stays blocked until
/// the provider finishes removing a child deleted a moment earlier.
#[must_use]
pub fn is_retryable_teardown_error(err: &CloudProviderError) -> bool {
    err.is_transient() || matches!(err, CloudProviderError::DependencyViolation(_))
}

/// Tears down recorded resources through a provider.
pub struct Compensator {
    provider: Arc<dyn InfraProvider>,
    retry: RetryConfig,
}

impl Compensator {
    /// Create a compensator over `provider`.
    #[must_use]
    pub fn new(provider: Arc<dyn InfraProvider>, retry: RetryConfig) -> Self {
        Self { provider, retry }
    }

    /// Tear down every record, last-created first, and report each outcome.
    pub async fn rollback(&self, ledger: ResourceLedger) -> RollbackReport {
        if ledger.is_empty() {
            info!("Nothing to roll back");
            return RollbackReport::default();
        }
        warn!(
            resources = ledger.len(),
            max_attempts = self.retry.max_attempts,
            budget_secs = self.retry.total_backoff().as_secs(),
            "Rolling back recorded resources"
        );

        let mut report = RollbackReport::default();
        for record in ledger.into_teardown_order() {
            let operation = format!("teardown of {record}");
            let outcome = with_retry_async(
                &self.retry,
                &operation,
                is_retryable_teardown_error,
                || self.teardown(&record),
            )
            .await;

            match outcome {
                Ok(((), attempts)) => {
                    info!(resource = %record, attempts, "Removed resource");
                    report.entries.push(Ok(record));
                }
                Err(exhausted) => {
                    error!(
                        resource = %record,
                        attempts = exhausted.attempts,
                        error = %exhausted.error,
                        "Failed to remove resource"
                    );
                    report.entries.push(Err(CompensationStepError {
                        record,
                        attempts: exhausted.attempts,
                        source: exhausted.error,
                    }));
                }
            }
        }

        info!(%report, "Rollback finished");
        report
    }

    async fn teardown(&self, record: &ResourceRecord) -> Result<(), CloudProviderError> {
        let provider = &self.provider;
        match record {
            ResourceRecord::Network { id } => provider.delete_network(id).await,
            ResourceRecord::Gateway { id, network_id } => {
                if let Err(e) = provider.detach_gateway(id, network_id).await {
                    warn!(
                        gateway = %id,
                        network = %network_id,
                        error = %e,
                        "Detach failed, deleting anyway"
                    );
                }
                provider.delete_gateway(id).await
            }
            ResourceRecord::Subnet { id } => provider.delete_subnet(id).await,
            ResourceRecord::RouteTable { id } => provider.delete_route_table(id).await,
            ResourceRecord::SecurityGroup { id } => provider.delete_security_group(id).await,
            ResourceRecord::ComputeInstance { id } => provider.terminate_instance(id).await,
            ResourceRecord::DatabaseSubnetGroup { id } => {
                provider.delete_database_subnet_group(id).await
            }
            ResourceRecord::DatabaseInstance { id } => provider.delete_database_instance(id).await,
        }
    }
}
