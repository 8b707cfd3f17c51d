//! Provisioning orchestrator.
//!
//! Runs the steps of [`ProvisionStep::PLAN`] one after another. Each
//! creation call that succeeds is recorded in the run's ledger before the
//! next call is made. The first failing call ends the run; everything in the
//! ledger is then handed to the [`Compensator`] and the original failure is
//! returned together with the rollback report.

use std::future::Future;
use std::sync::Arc;

use bastion_cloud::{
    CloudProviderError, CreateDatabaseRequest, InfraProvider, IngressRule, LaunchInstanceRequest,
    Route, SecurityGroupRequest,
};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::compensator::Compensator;
use crate::config::ProvisionConfig;
use crate::error::{ProvisionError, ProvisioningStepError};
use crate::ledger::{ResourceLedger, ResourceRecord};
use crate::network::SubnetLayout;
use crate::state::{ProvisionStep, RunState, RunTracker};

const SSH_PORT: u16 = 22;
const DEFAULT_ROUTE: &str = "0.0.0.0/0";

/// Identifiers of a fully provisioned bastion environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BastionEnvironment {
    pub network_id: String,
    pub gateway_id: String,
    pub private_subnet_ids: Vec<String>,
    pub public_subnet_id: String,
    pub instance_security_group_id: String,
    pub instance_id: String,
    pub database_subnet_group: String,
    pub database_security_group_id: String,
    pub database_instance_id: String,
}

/// A completed run.
#[derive(Debug)]
pub struct ProvisionOutcome {
    pub run_id: Uuid,
    pub state: RunState,
    pub environment: BastionEnvironment,
    /// Everything the run created, in creation order.
    pub ledger: ResourceLedger,
}

struct Run {
    tracker: RunTracker,
    ledger: ResourceLedger,
}

impl Run {
    fn transition(&mut self, next: RunState) {
        // Steps are driven in plan order; keep going so rollback still runs.
        if let Err(e) = self.tracker.advance(next) {
            error!(error = %e, "Run state machine rejected transition");
        }
    }
}

/// Drives a provisioning run against a provider.
pub struct Provisioner {
    provider: Arc<dyn InfraProvider>,
    config: ProvisionConfig,
    compensator: Compensator,
}

impl Provisioner {
    /// Create a provisioner. The compensator shares the same provider.
    #[must_use]
    pub fn new(provider: Arc<dyn InfraProvider>, config: ProvisionConfig) -> Self {
        let compensator = Compensator::new(provider.clone(), config.retry_config());
        Self {
            provider,
            config,
            compensator,
        }
    }

    /// Compensator used for automatic rollback.
    #[must_use]
    pub fn compensator(&self) -> &Compensator {
        &self.compensator
    }

    /// Provision the bastion environment.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Configuration`] before any provider call if
    /// the configuration is invalid, or [`ProvisionError::Step`] after the
    /// recorded resources have been rolled back.
    pub async fn provision(&self) -> Result<ProvisionOutcome, ProvisionError> {
        let layout = self.config.validate()?;
        let run_id = Uuid::new_v4();
        let span = info_span!("provision", run_id = %run_id);
        self.run(run_id, layout).instrument(span).await
    }

    async fn run(
        &self,
        run_id: Uuid,
        layout: SubnetLayout,
    ) -> Result<ProvisionOutcome, ProvisionError> {
        info!(
            region = %self.config.region,
            network = %layout.network,
            steps = ProvisionStep::PLAN.len(),
            "Starting provisioning run"
        );

        let mut run = Run {
            tracker: RunTracker::new(),
            ledger: ResourceLedger::new(),
        };

        match self.execute(&mut run, &layout).await {
            Ok(environment) => {
                run.transition(RunState::Completed);
                info!(resources = run.ledger.len(), "Provisioning run completed");
                Ok(ProvisionOutcome {
                    run_id,
                    state: run.tracker.state(),
                    environment,
                    ledger: run.ledger,
                })
            }
            Err(failure) => {
                error!(
                    step = %failure.step,
                    error = %failure.source,
                    recorded = run.ledger.len(),
                    "Provisioning step failed"
                );
                run.transition(RunState::Failed);
                run.transition(RunState::RollingBack);
                let report = self
                    .compensator
                    .rollback(std::mem::take(&mut run.ledger))
                    .await;
                run.transition(RunState::RolledBack);
                Err(ProvisionError::Step { failure, report })
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn execute(
        &self,
        run: &mut Run,
        layout: &SubnetLayout,
    ) -> Result<BastionEnvironment, ProvisioningStepError> {
        let provider = &self.provider;
        let config = &self.config;
        let zone = config.availability_zone();

        let network_cidr = layout.network.to_string();
        let network_id = self
            .create(
                run,
                ProvisionStep::Network,
                provider.create_network(&network_cidr),
                |id| ResourceRecord::Network { id },
            )
            .await?;
        self.bounded(
            ProvisionStep::Network,
            provider.tag_resource(&network_id, &config.names.network),
        )
        .await?;

        let gateway_id = self
            .create(
                run,
                ProvisionStep::Gateway,
                provider.create_gateway(),
                |id| ResourceRecord::Gateway {
                    id,
                    network_id: network_id.clone(),
                },
            )
            .await?;
        self.bounded(
            ProvisionStep::Gateway,
            provider.attach_gateway(&gateway_id, &network_id),
        )
        .await?;

        let mut private_subnet_ids = Vec::with_capacity(layout.private.len());
        for (index, block) in (0u8..).zip(&layout.private) {
            let cidr = block.to_string();
            let subnet_id = self
                .create(
                    run,
                    ProvisionStep::PrivateSubnet(index),
                    provider.create_subnet(&network_id, &cidr, &zone),
                    |id| ResourceRecord::Subnet { id },
                )
                .await?;

            let step = ProvisionStep::PrivateRouteTable(index);
            let route_table_id = self
                .create(
                    run,
                    step,
                    provider.create_route_table(&network_id),
                    |id| ResourceRecord::RouteTable { id },
                )
                .await?;
            self.bounded(
                step,
                provider.associate_route_table(&route_table_id, &subnet_id),
            )
            .await?;
            private_subnet_ids.push(subnet_id);
        }

        let public_cidr = layout.public.to_string();
        let public_subnet_id = self
            .create(
                run,
                ProvisionStep::PublicSubnet,
                provider.create_subnet(&network_id, &public_cidr, &zone),
                |id| ResourceRecord::Subnet { id },
            )
            .await?;

        let public_route_table_id = self
            .create(
                run,
                ProvisionStep::PublicRouteTable,
                provider.create_route_table(&network_id),
                |id| ResourceRecord::RouteTable { id },
            )
            .await?;
        let default_route = Route {
            destination: DEFAULT_ROUTE.to_string(),
            gateway_id: gateway_id.clone(),
        };
        self.bounded(
            ProvisionStep::PublicRouteTable,
            provider.create_route(&public_route_table_id, &default_route),
        )
        .await?;
        self.bounded(
            ProvisionStep::PublicRouteTable,
            provider.associate_route_table(&public_route_table_id, &public_subnet_id),
        )
        .await?;
        self.bounded(
            ProvisionStep::PublicRouteTable,
            provider.enable_public_ip_on_launch(&public_subnet_id),
        )
        .await?;

        let instance_group = SecurityGroupRequest {
            name: config.names.instance_security_group.clone(),
            description: "SSH access to the bastion host".to_string(),
        };
        let instance_security_group_id = self
            .create(
                run,
                ProvisionStep::InstanceSecurityGroup,
                provider.create_security_group(&network_id, &instance_group),
                |id| ResourceRecord::SecurityGroup { id },
            )
            .await?;
        self.bounded(
            ProvisionStep::InstanceSecurityGroup,
            provider.authorize_ingress(
                &instance_security_group_id,
                &[IngressRule::from_cidr(SSH_PORT, &config.instance.ssh_cidr)],
            ),
        )
        .await?;

        let launch = LaunchInstanceRequest {
            name: config.instance.name.clone(),
            image_id: config.instance.image_id.clone(),
            instance_type: config.instance.instance_type.clone(),
            key_name: config.instance.key_name.clone(),
        };
        let instance_id = self
            .create(
                run,
                ProvisionStep::Instance,
                provider.launch_instance(&instance_security_group_id, &public_subnet_id, &launch),
                |id| ResourceRecord::ComputeInstance { id },
            )
            .await?;

        let database_subnet_group = self
            .create(
                run,
                ProvisionStep::DatabaseSubnetGroup,
                provider.create_database_subnet_group(
                    &config.names.database_subnet_group,
                    &network_id,
                    &private_subnet_ids,
                ),
                |id| ResourceRecord::DatabaseSubnetGroup { id },
            )
            .await?;

        let database_group = SecurityGroupRequest {
            name: config.names.database_security_group.clone(),
            description: "Database access from the bastion host".to_string(),
        };
        let database_security_group_id = self
            .create(
                run,
                ProvisionStep::DatabaseSecurityGroup,
                provider.create_security_group(&network_id, &database_group),
                |id| ResourceRecord::SecurityGroup { id },
            )
            .await?;
        self.bounded(
            ProvisionStep::DatabaseSecurityGroup,
            provider.authorize_ingress(
                &database_security_group_id,
                &[IngressRule::from_group(
                    config.database.port,
                    &instance_security_group_id,
                )],
            ),
        )
        .await?;

        let database = CreateDatabaseRequest {
            identifier: config.database.identifier.clone(),
            engine: config.database.engine.clone(),
            instance_class: config.database.instance_class.clone(),
            allocated_storage_gb: config.database.allocated_storage_gb,
            master_username: config.database.master_username.clone(),
            master_password: config.database.master_password.clone(),
        };
        let database_instance_id = self
            .create(
                run,
                ProvisionStep::DatabaseInstance,
                provider.create_database_instance(
                    &database_security_group_id,
                    &database_subnet_group,
                    &database,
                ),
                |id| ResourceRecord::DatabaseInstance { id },
            )
            .await?;

        Ok(BastionEnvironment {
            network_id,
            gateway_id,
            private_subnet_ids,
            public_subnet_id,
            instance_security_group_id,
            instance_id,
            database_subnet_group,
            database_security_group_id,
            database_instance_id,
        })
    }

    /// Enter `step`, make its creation call and record the new resource.
    async fn create<F>(
        &self,
        run: &mut Run,
        step: ProvisionStep,
        call: F,
        record: impl FnOnce(String) -> ResourceRecord,
    ) -> Result<String, ProvisioningStepError>
    where
        F: Future<Output = Result<String, CloudProviderError>>,
    {
        run.transition(RunState::InProgress(step));
        info!(
            step = %step,
            number = step.number(),
            total = ProvisionStep::PLAN.len(),
            "Running step"
        );

        let id = self.bounded(step, call).await?;
        run.ledger.record(record(id.clone()));
        Ok(id)
    }

    /// Await a provider call within the step timeout.
    async fn bounded<T, F>(&self, step: ProvisionStep, call: F) -> Result<T, ProvisioningStepError>
    where
        F: Future<Output = Result<T, CloudProviderError>>,
    {
        let limit = self.config.step_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result.map_err(|source| ProvisioningStepError { step, source }),
            Err(_) => Err(ProvisioningStepError {
                step,
                source: CloudProviderError::Timeout(limit.as_secs()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_cloud::memory::{Fault, Operation};
    use bastion_cloud::InMemoryProvider;

    fn config() -> ProvisionConfig {
        let mut config = ProvisionConfig::default();
        config.instance.image_id = "ami-test".to_string();
        config.database.master_password = "password123".to_string();
        config.retry.initial_delay_ms = 1;
        config.retry.max_delay_ms = 2;
        config
    }

    #[tokio::test]
    async fn test_invalid_config_makes_no_calls() {
        let provider = Arc::new(InMemoryProvider::new());
        let mut config = config();
        config.network_cidr = "10.0.0.0/28".to_string();

        let err = Provisioner::new(provider.clone(), config)
            .provision()
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Configuration(_)));
        assert!(err.rollback_report().is_none());
        assert!(provider.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_gateway_recorded_before_attach() {
        let provider = Arc::new(InMemoryProvider::new());
        provider
            .inject(Operation::AttachGateway, Fault::Rejected)
            .await;

        let err = Provisioner::new(provider.clone(), config())
            .provision()
            .await
            .unwrap_err();

        let ProvisionError::Step { failure, report } = err else {
            panic!("expected a step failure");
        };
        assert_eq!(failure.step, ProvisionStep::Gateway);
        let attempted: Vec<String> = report.attempted().iter().map(ToString::to_string).collect();
        assert_eq!(
            attempted,
            vec!["gateway=igw-00000002:vpc-00000001", "network=vpc-00000001"]
        );
        assert!(report.is_clean());
        assert!(provider.live_resources().await.is_empty());
    }

    #[tokio::test]
    async fn test_successful_run_is_completed() {
        let provider = Arc::new(InMemoryProvider::new());
        let outcome = Provisioner::new(provider, config())
            .provision()
            .await
            .unwrap();

        assert_eq!(outcome.state, RunState::Completed);
        assert_eq!(outcome.environment.private_subnet_ids.len(), 2);
        assert_eq!(outcome.environment.database_instance_id, "bastion-db-instance");
        assert_eq!(outcome.ledger.len(), ProvisionStep::PLAN.len());
    }
}
