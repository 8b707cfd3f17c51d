//! Infrastructure provider trait and common types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during infrastructure provider operations.
#[derive(Error, Debug)]
pub enum CloudProviderError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Operation timed out.
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Quota exceeded.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Request was throttled by the provider.
    #[error("Request throttled: {0}")]
    Throttled(String),

    /// Resource still has dependents attached.
    #[error("Dependency violation: {0}")]
    DependencyViolation(String),
}

impl CloudProviderError {
    /// Whether repeating the same call later could succeed.
    ///
    /// Transport failures, server-side errors, throttling and timeouts are
    /// transient. Missing resources, bad input and auth failures are not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) | Self::Throttled(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::NotFound(_)
            | Self::Config(_)
            | Self::Serialization(_)
            | Self::Auth(_)
            | Self::QuotaExceeded(_)
            | Self::DependencyViolation(_) => false,
        }
    }

    /// Whether the error reports that the resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

// ============================================================================
// Request types
// ============================================================================

/// Where ingress traffic for a rule may come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSource {
    /// An IPv4 CIDR block.
    Cidr(String),
    /// Members of another security group.
    SecurityGroup(String),
}

/// A single TCP ingress rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    /// TCP port.
    pub port: u16,
    /// Allowed source.
    pub source: RuleSource,
}

impl IngressRule {
    /// Allow `port` from a CIDR block.
    #[must_use]
    pub fn from_cidr(port: u16, cidr: impl Into<String>) -> Self {
        Self {
            port,
            source: RuleSource::Cidr(cidr.into()),
        }
    }

    /// Allow `port` from members of a security group.
    #[must_use]
    pub fn from_group(port: u16, group_id: impl Into<String>) -> Self {
        Self {
            port,
            source: RuleSource::SecurityGroup(group_id.into()),
        }
    }
}

/// Request to create a security group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityGroupRequest {
    /// Group name.
    pub name: String,
    /// Group description.
    pub description: String,
}

/// A route to add to a route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Destination CIDR block.
    pub destination: String,
    /// Gateway the traffic is sent through.
    pub gateway_id: String,
}

/// Request to launch a compute instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchInstanceRequest {
    /// Value of the `Name` tag.
    pub name: String,
    /// Machine image ID.
    pub image_id: String,
    /// Instance type/size.
    pub instance_type: String,
    /// Existing key pair name (optional).
    pub key_name: Option<String>,
}

/// Request to create a managed database instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDatabaseRequest {
    /// Database instance identifier.
    pub identifier: String,
    /// Engine name (e.g., "mysql").
    pub engine: String,
    /// Instance class (e.g., "db.t3.micro").
    pub instance_class: String,
    /// Allocated storage in GiB.
    pub allocated_storage_gb: u32,
    /// Master user name.
    pub master_username: String,
    /// Master user password.
    pub master_password: String,
}

/// Trait for infrastructure providers.
///
/// Every call is a single remote mutation or lookup. Identifiers returned by
/// the `create_*` calls are opaque to callers and are passed back unchanged.
#[async_trait]
pub trait InfraProvider: Send + Sync {
    // ========================================================================
    // Network operations
    // ========================================================================

    /// Create a network for the given address range.
    async fn create_network(&self, cidr: &str) -> Result<String, CloudProviderError>;

    /// Delete a network.
    async fn delete_network(&self, network_id: &str) -> Result<(), CloudProviderError>;

    /// Set the `Name` tag on any resource.
    async fn tag_resource(&self, resource_id: &str, name: &str) -> Result<(), CloudProviderError>;

    /// Create an internet gateway.
    async fn create_gateway(&self) -> Result<String, CloudProviderError>;

    /// Attach a gateway to a network.
    async fn attach_gateway(
        &self,
        gateway_id: &str,
        network_id: &str,
    ) -> Result<(), CloudProviderError>;

    /// Detach a gateway from a network.
    async fn detach_gateway(
        &self,
        gateway_id: &str,
        network_id: &str,
    ) -> Result<(), CloudProviderError>;

    /// Delete a gateway.
    async fn delete_gateway(&self, gateway_id: &str) -> Result<(), CloudProviderError>;

    /// Create a subnet in a network.
    async fn create_subnet(
        &self,
        network_id: &str,
        cidr: &str,
        zone: &str,
    ) -> Result<String, CloudProviderError>;

    /// Make instances launched in the subnet get a public IP.
    async fn enable_public_ip_on_launch(&self, subnet_id: &str) -> Result<(), CloudProviderError>;

    /// Delete a subnet.
    async fn delete_subnet(&self, subnet_id: &str) -> Result<(), CloudProviderError>;

    /// Create an empty route table in a network.
    async fn create_route_table(&self, network_id: &str) -> Result<String, CloudProviderError>;

    /// Add a route to an existing route table.
    async fn create_route(
        &self,
        route_table_id: &str,
        route: &Route,
    ) -> Result<(), CloudProviderError>;

    /// Associate a route table with a subnet.
    async fn associate_route_table(
        &self,
        route_table_id: &str,
        subnet_id: &str,
    ) -> Result<(), CloudProviderError>;

    /// Delete a route table.
    async fn delete_route_table(&self, route_table_id: &str) -> Result<(), CloudProviderError>;

    // ========================================================================
    // Security group operations
    // ========================================================================

    /// Create a security group in a network. It starts with no ingress rules.
    async fn create_security_group(
        &self,
        network_id: &str,
        req: &SecurityGroupRequest,
    ) -> Result<String, CloudProviderError>;

    /// Allow ingress into an existing security group.
    async fn authorize_ingress(
        &self,
        group_id: &str,
        rules: &[IngressRule],
    ) -> Result<(), CloudProviderError>;

    /// Delete a security group.
    async fn delete_security_group(&self, group_id: &str) -> Result<(), CloudProviderError>;

    // ========================================================================
    // Compute operations
    // ========================================================================

    /// Launch a compute instance.
    async fn launch_instance(
        &self,
        security_group_id: &str,
        subnet_id: &str,
        req: &LaunchInstanceRequest,
    ) -> Result<String, CloudProviderError>;

    /// Terminate a compute instance.
    async fn terminate_instance(&self, instance_id: &str) -> Result<(), CloudProviderError>;

    // ========================================================================
    // Database operations
    // ========================================================================

    /// Create a database subnet group and return its name.
    async fn create_database_subnet_group(
        &self,
        name: &str,
        network_id: &str,
        subnet_ids: &[String],
    ) -> Result<String, CloudProviderError>;

    /// Delete a database subnet group.
    async fn delete_database_subnet_group(&self, name: &str) -> Result<(), CloudProviderError>;

    /// Create a database instance and return its identifier.
    async fn create_database_instance(
        &self,
        security_group_id: &str,
        subnet_group_name: &str,
        req: &CreateDatabaseRequest,
    ) -> Result<String, CloudProviderError>;

    /// Delete a database instance without a final snapshot.
    async fn delete_database_instance(&self, identifier: &str) -> Result<(), CloudProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CloudProviderError::Timeout(30).is_transient());
        assert!(CloudProviderError::Throttled("slow down".into()).is_transient());
        assert!(CloudProviderError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());

        assert!(!CloudProviderError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
        assert!(!CloudProviderError::NotFound("vpc-1".into()).is_transient());
        assert!(!CloudProviderError::QuotaExceeded("instances".into()).is_transient());
    }

    #[test]
    fn test_ingress_rule_constructors() {
        let ssh = IngressRule::from_cidr(22, "0.0.0.0/0");
        assert_eq!(ssh.source, RuleSource::Cidr("0.0.0.0/0".into()));

        let db = IngressRule::from_group(3306, "sg-1");
        assert_eq!(db.port, 3306);
        assert_eq!(db.source, RuleSource::SecurityGroup("sg-1".into()));
    }
}
