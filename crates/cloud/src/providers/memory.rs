//! In-memory infrastructure provider.
//!
//! Hands out deterministic identifiers, tracks which resources are live,
//! logs every call, and can be told to fail specific operations. Backs the
//! CLI's `--dry-run` mode and the workspace tests.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::providers::traits::{
    CloudProviderError, CreateDatabaseRequest, InfraProvider, IngressRule, LaunchInstanceRequest,
    Route, RuleSource, SecurityGroupRequest,
};

/// Provider operations, used to log calls and target faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateNetwork,
    DeleteNetwork,
    TagResource,
    CreateGateway,
    AttachGateway,
    DetachGateway,
    DeleteGateway,
    CreateSubnet,
    EnablePublicIp,
    DeleteSubnet,
    CreateRouteTable,
    CreateRoute,
    AssociateRouteTable,
    DeleteRouteTable,
    CreateSecurityGroup,
    AuthorizeIngress,
    DeleteSecurityGroup,
    LaunchInstance,
    TerminateInstance,
    CreateDatabaseSubnetGroup,
    DeleteDatabaseSubnetGroup,
    CreateDatabaseInstance,
    DeleteDatabaseInstance,
}

impl Operation {
    /// Whether the operation removes a resource.
    #[must_use]
    pub fn is_teardown(self) -> bool {
        matches!(
            self,
            Self::DeleteNetwork
                | Self::DetachGateway
                | Self::DeleteGateway
                | Self::DeleteSubnet
                | Self::DeleteRouteTable
                | Self::DeleteSecurityGroup
                | Self::TerminateInstance
                | Self::DeleteDatabaseSubnetGroup
                | Self::DeleteDatabaseInstance
        )
    }
}

/// A fault to inject into an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Fail with a quota error.
    QuotaExceeded,
    /// Fail with a non-retryable API error.
    Rejected,
    /// Fail the next `n` matching calls with a 503, then behave normally.
    Unavailable(u32),
    /// Answer only after sleeping.
    Delay(Duration),
}

/// One logged provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCall {
    /// Operation invoked.
    pub operation: Operation,
    /// Primary identifier or argument of the call.
    pub target: String,
}

#[derive(Debug)]
struct Injection {
    fault: Fault,
    /// Matching calls to let through before the fault applies.
    skip: u32,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    live: BTreeSet<String>,
    /// Child resource -> owning network.
    parents: HashMap<String, String>,
    /// (gateway, network) pairs currently attached.
    attachments: HashSet<(String, String)>,
    calls: Vec<ProviderCall>,
    call_counts: HashMap<Operation, u32>,
    injections: HashMap<Operation, Injection>,
}

impl State {
    fn allocate(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        let id = format!("{prefix}-{:08x}", self.next_id);
        self.live.insert(id.clone());
        id
    }

    fn remove(&mut self, id: &str) -> Result<(), CloudProviderError> {
        if !self.live.contains(id) {
            return Err(CloudProviderError::NotFound(id.to_string()));
        }
        if self.parents.values().any(|parent| parent == id)
            || self.attachments.iter().any(|(gw, vpc)| gw == id || vpc == id)
        {
            return Err(CloudProviderError::DependencyViolation(format!(
                "{id} has dependent resources"
            )));
        }
        self.live.remove(id);
        self.parents.remove(id);
        Ok(())
    }

    fn require_live(&self, id: &str) -> Result<(), CloudProviderError> {
        if self.live.contains(id) {
            Ok(())
        } else {
            Err(CloudProviderError::NotFound(id.to_string()))
        }
    }
}

/// In-memory infrastructure provider.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    state: Mutex<State>,
}

impl InMemoryProvider {
    /// Create an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `operation` hit `fault`.
    pub async fn inject(&self, operation: Operation, fault: Fault) {
        self.inject_after(operation, 0, fault).await;
    }

    /// Let `skip` calls to `operation` through, then hit `fault`.
    pub async fn inject_after(&self, operation: Operation, skip: u32, fault: Fault) {
        self.state
            .lock()
            .await
            .injections
            .insert(operation, Injection { fault, skip });
    }

    /// Register a resource that already exists (e.g., left by a crashed run).
    pub async fn insert_existing(&self, id: impl Into<String>) {
        self.state.lock().await.live.insert(id.into());
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().await.calls.clone()
    }

    /// Teardown calls made so far, in order.
    pub async fn teardown_calls(&self) -> Vec<ProviderCall> {
        self.calls()
            .await
            .into_iter()
            .filter(|c| c.operation.is_teardown())
            .collect()
    }

    /// Identifiers of resources that currently exist.
    pub async fn live_resources(&self) -> Vec<String> {
        self.state.lock().await.live.iter().cloned().collect()
    }

    /// Log the call and apply any injected fault.
    async fn enter(&self, operation: Operation, target: &str) -> Result<(), CloudProviderError> {
        let delay = {
            let mut state = self.state.lock().await;
            state.calls.push(ProviderCall {
                operation,
                target: target.to_string(),
            });
            let count = state.call_counts.entry(operation).or_insert(0);
            *count += 1;
            let count = *count;

            debug!(?operation, target = %target, call = count, "In-memory provider call");

            match state.injections.get_mut(&operation) {
                Some(injection) if count > injection.skip => match &mut injection.fault {
                    Fault::QuotaExceeded => {
                        return Err(CloudProviderError::QuotaExceeded(format!(
                            "{operation:?} quota exhausted"
                        )));
                    }
                    Fault::Rejected => {
                        return Err(CloudProviderError::Api {
                            status: 400,
                            message: format!("{operation:?} rejected"),
                        });
                    }
                    Fault::Unavailable(remaining) => {
                        if *remaining > 0 {
                            *remaining -= 1;
                            return Err(CloudProviderError::Api {
                                status: 503,
                                message: "Service unavailable".to_string(),
                            });
                        }
                        None
                    }
                    Fault::Delay(delay) => Some(*delay),
                },
                _ => None,
            }
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

#[async_trait]
impl InfraProvider for InMemoryProvider {
    async fn create_network(&self, cidr: &str) -> Result<String, CloudProviderError> {
        self.enter(Operation::CreateNetwork, cidr).await?;
        Ok(self.state.lock().await.allocate("vpc"))
    }

    async fn delete_network(&self, network_id: &str) -> Result<(), CloudProviderError> {
        self.enter(Operation::DeleteNetwork, network_id).await?;
        self.state.lock().await.remove(network_id)
    }

    async fn tag_resource(&self, resource_id: &str, _name: &str) -> Result<(), CloudProviderError> {
        self.enter(Operation::TagResource, resource_id).await?;
        self.state.lock().await.require_live(resource_id)
    }

    async fn create_gateway(&self) -> Result<String, CloudProviderError> {
        self.enter(Operation::CreateGateway, "").await?;
        Ok(self.state.lock().await.allocate("igw"))
    }

    async fn attach_gateway(
        &self,
        gateway_id: &str,
        network_id: &str,
    ) -> Result<(), CloudProviderError> {
        self.enter(Operation::AttachGateway, gateway_id).await?;
        let mut state = self.state.lock().await;
        state.require_live(gateway_id)?;
        state.require_live(network_id)?;
        state
            .attachments
            .insert((gateway_id.to_string(), network_id.to_string()));
        Ok(())
    }

    async fn detach_gateway(
        &self,
        gateway_id: &str,
        network_id: &str,
    ) -> Result<(), CloudProviderError> {
        self.enter(Operation::DetachGateway, gateway_id).await?;
        let mut state = self.state.lock().await;
        if state
            .attachments
            .remove(&(gateway_id.to_string(), network_id.to_string()))
        {
            Ok(())
        } else {
            Err(CloudProviderError::NotFound(format!(
                "{gateway_id} is not attached to {network_id}"
            )))
        }
    }

    async fn delete_gateway(&self, gateway_id: &str) -> Result<(), CloudProviderError> {
        self.enter(Operation::DeleteGateway, gateway_id).await?;
        self.state.lock().await.remove(gateway_id)
    }

    async fn create_subnet(
        &self,
        network_id: &str,
        _cidr: &str,
        _zone: &str,
    ) -> Result<String, CloudProviderError> {
        self.enter(Operation::CreateSubnet, network_id).await?;
        let mut state = self.state.lock().await;
        state.require_live(network_id)?;
        let id = state.allocate("subnet");
        state.parents.insert(id.clone(), network_id.to_string());
        Ok(id)
    }

    async fn enable_public_ip_on_launch(&self, subnet_id: &str) -> Result<(), CloudProviderError> {
        self.enter(Operation::EnablePublicIp, subnet_id).await?;
        self.state.lock().await.require_live(subnet_id)
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<(), CloudProviderError> {
        self.enter(Operation::DeleteSubnet, subnet_id).await?;
        self.state.lock().await.remove(subnet_id)
    }

    async fn create_route_table(&self, network_id: &str) -> Result<String, CloudProviderError> {
        self.enter(Operation::CreateRouteTable, network_id).await?;
        let mut state = self.state.lock().await;
        state.require_live(network_id)?;
        let id = state.allocate("rtb");
        state.parents.insert(id.clone(), network_id.to_string());
        Ok(id)
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        route: &Route,
    ) -> Result<(), CloudProviderError> {
        self.enter(Operation::CreateRoute, route_table_id).await?;
        let state = self.state.lock().await;
        state.require_live(route_table_id)?;
        state.require_live(&route.gateway_id)
    }

    async fn associate_route_table(
        &self,
        route_table_id: &str,
        subnet_id: &str,
    ) -> Result<(), CloudProviderError> {
        self.enter(Operation::AssociateRouteTable, route_table_id)
            .await?;
        let state = self.state.lock().await;
        state.require_live(route_table_id)?;
        state.require_live(subnet_id)
    }

    async fn delete_route_table(&self, route_table_id: &str) -> Result<(), CloudProviderError> {
        self.enter(Operation::DeleteRouteTable, route_table_id)
            .await?;
        self.state.lock().await.remove(route_table_id)
    }

    async fn create_security_group(
        &self,
        network_id: &str,
        req: &SecurityGroupRequest,
    ) -> Result<String, CloudProviderError> {
        self.enter(Operation::CreateSecurityGroup, &req.name).await?;
        let mut state = self.state.lock().await;
        state.require_live(network_id)?;
        let id = state.allocate("sg");
        state.parents.insert(id.clone(), network_id.to_string());
        Ok(id)
    }

    async fn authorize_ingress(
        &self,
        group_id: &str,
        rules: &[IngressRule],
    ) -> Result<(), CloudProviderError> {
        self.enter(Operation::AuthorizeIngress, group_id).await?;
        let state = self.state.lock().await;
        state.require_live(group_id)?;
        for rule in rules {
            if let RuleSource::SecurityGroup(source) = &rule.source {
                state.require_live(source)?;
            }
        }
        Ok(())
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<(), CloudProviderError> {
        self.enter(Operation::DeleteSecurityGroup, group_id).await?;
        self.state.lock().await.remove(group_id)
    }

    async fn launch_instance(
        &self,
        security_group_id: &str,
        subnet_id: &str,
        req: &LaunchInstanceRequest,
    ) -> Result<String, CloudProviderError> {
        self.enter(Operation::LaunchInstance, &req.name).await?;
        let mut state = self.state.lock().await;
        state.require_live(security_group_id)?;
        state.require_live(subnet_id)?;
        let id = state.allocate("i");
        state.parents.insert(id.clone(), subnet_id.to_string());
        Ok(id)
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<(), CloudProviderError> {
        self.enter(Operation::TerminateInstance, instance_id).await?;
        self.state.lock().await.remove(instance_id)
    }

    async fn create_database_subnet_group(
        &self,
        name: &str,
        network_id: &str,
        subnet_ids: &[String],
    ) -> Result<String, CloudProviderError> {
        self.enter(Operation::CreateDatabaseSubnetGroup, name).await?;
        let mut state = self.state.lock().await;
        state.require_live(network_id)?;
        for subnet_id in subnet_ids {
            state.require_live(subnet_id)?;
        }
        if !state.live.insert(name.to_string()) {
            return Err(CloudProviderError::Api {
                status: 400,
                message: format!("DBSubnetGroupAlreadyExists: {name}"),
            });
        }
        Ok(name.to_string())
    }

    async fn delete_database_subnet_group(&self, name: &str) -> Result<(), CloudProviderError> {
        self.enter(Operation::DeleteDatabaseSubnetGroup, name)
            .await?;
        self.state.lock().await.remove(name)
    }

    async fn create_database_instance(
        &self,
        security_group_id: &str,
        subnet_group_name: &str,
        req: &CreateDatabaseRequest,
    ) -> Result<String, CloudProviderError> {
        self.enter(Operation::CreateDatabaseInstance, &req.identifier)
            .await?;
        let mut state = self.state.lock().await;
        state.require_live(security_group_id)?;
        state.require_live(subnet_group_name)?;
        if !state.live.insert(req.identifier.clone()) {
            return Err(CloudProviderError::Api {
                status: 400,
                message: format!("DBInstanceAlreadyExists: {}", req.identifier),
            });
        }
        Ok(req.identifier.clone())
    }

    async fn delete_database_instance(&self, identifier: &str) -> Result<(), CloudProviderError> {
        self.enter(Operation::DeleteDatabaseInstance, identifier)
            .await?;
        self.state.lock().await.remove(identifier)
    }
}
