//! Provisioning configuration.
//!
//! Loaded from an optional YAML file, then overridden field by field from
//! the command line. Every field has a default except the image id and the
//! database password, which must be supplied.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigurationError;
use crate::network::{Ipv4Cidr, SubnetLayout};
use crate::state::RetryConfig;

/// Top-level provisioning configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Cloud region.
    pub region: String,
    /// Availability zone for all subnets; `<region>a` when unset.
    pub availability_zone: Option<String>,
    /// Network address block.
    pub network_cidr: String,
    /// Names given to created resources.
    pub names: NamingConfig,
    /// Bastion instance settings.
    pub instance: InstanceConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Upper bound on each provider call of a step, in seconds.
    pub step_timeout_secs: u64,
    /// Retry policy for teardown calls.
    pub retry: RetrySettings,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            availability_zone: None,
            network_cidr: "10.0.0.0/16".to_string(),
            names: NamingConfig::default(),
            instance: InstanceConfig::default(),
            database: DatabaseConfig::default(),
            step_timeout_secs: 300,
            retry: RetrySettings::default(),
        }
    }
}

/// Resource names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub network: String,
    pub instance_security_group: String,
    pub database_security_group: String,
    pub database_subnet_group: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            network: "bastion-vpc".to_string(),
            instance_security_group: "bastion-ec2-sg".to_string(),
            database_security_group: "bastion-db-sg".to_string(),
            database_subnet_group: "bastion-db-subnet-group".to_string(),
        }
    }
}

/// Compute instance settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub name: String,
    /// Machine image; required.
    pub image_id: String,
    pub instance_type: String,
    /// Existing key pair to install; referenced, never created.
    pub key_name: Option<String>,
    /// Source block allowed to reach SSH.
    pub ssh_cidr: String,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            name: "bastion-ec2".to_string(),
            image_id: String::new(),
            instance_type: "t2.micro".to_string(),
            key_name: Some("bastion-key".to_string()),
            ssh_cidr: "0.0.0.0/0".to_string(),
        }
    }
}

/// Managed database settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub identifier: String,
    pub engine: String,
    pub instance_class: String,
    pub allocated_storage_gb: u32,
    pub port: u16,
    pub master_username: String,
    /// Required.
    pub master_password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            identifier: "bastion-db-instance".to_string(),
            engine: "mysql".to_string(),
            instance_class: "db.t3.micro".to_string(),
            allocated_storage_gb: 20,
            port: 3306,
            master_username: "admin".to_string(),
            master_password: String::new(),
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("identifier", &self.identifier)
            .field("engine", &self.engine)
            .field("instance_class", &self.instance_class)
            .field("allocated_storage_gb", &self.allocated_storage_gb)
            .field("port", &self.port)
            .field("master_username", &self.master_username)
            .field("master_password", &"<redacted>")
            .finish()
    }
}

/// Teardown retry policy as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            initial_delay_ms: u64::try_from(defaults.initial_delay.as_millis()).unwrap_or(u64::MAX),
            max_delay_ms: u64::try_from(defaults.max_delay.as_millis()).unwrap_or(u64::MAX),
            backoff_multiplier: defaults.backoff_multiplier,
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            backoff_multiplier: settings.backoff_multiplier,
        }
    }
}

fn require(value: &str, field: &str) -> Result<(), ConfigurationError> {
    if value.trim().is_empty() {
        Err(ConfigurationError::new(format!("{field} must not be empty")))
    } else {
        Ok(())
    }
}

impl ProvisionConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::new(format!("failed to read config {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml(&content)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse configuration from YAML. Missing fields take their defaults.
    ///
    /// # Errors
    /// Returns an error if the document does not match the schema.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigurationError> {
        serde_yaml::from_str(content)
            .map_err(|e| ConfigurationError::new(format!("failed to parse config: {e}")))
    }

    /// Availability zone used for every subnet.
    #[must_use]
    pub fn availability_zone(&self) -> String {
        self.availability_zone
            .clone()
            .unwrap_or_else(|| format!("{}a", self.region))
    }

    /// Step timeout as a duration.
    #[must_use]
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    /// Teardown retry policy.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::from(&self.retry)
    }

    /// Check every field and plan the subnets.
    ///
    /// # Errors
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<SubnetLayout, ConfigurationError> {
        require(&self.region, "region")?;
        require(&self.availability_zone(), "availability zone")?;
        require(&self.names.network, "network name")?;
        require(&self.names.instance_security_group, "instance security group name")?;
        require(&self.names.database_security_group, "database security group name")?;
        require(&self.names.database_subnet_group, "database subnet group name")?;
        if self.names.instance_security_group == self.names.database_security_group {
            return Err(ConfigurationError::new(
                "instance and database security groups need different names",
            ));
        }

        require(&self.instance.name, "instance name")?;
        require(&self.instance.image_id, "image id")?;
        require(&self.instance.instance_type, "instance type")?;
        if let Some(key) = &self.instance.key_name {
            require(key, "key name")?;
        }
        self.instance
            .ssh_cidr
            .parse::<Ipv4Cidr>()
            .map_err(|e| ConfigurationError::new(format!("ssh cidr: {}", e.message())))?;

        require(&self.database.identifier, "database identifier")?;
        require(&self.database.engine, "database engine")?;
        require(&self.database.instance_class, "database instance class")?;
        require(&self.database.master_username, "database username")?;
        require(&self.database.master_password, "database password")?;
        if self.database.allocated_storage_gb == 0 {
            return Err(ConfigurationError::new("database storage must be positive"));
        }
        if self.database.port == 0 {
            return Err(ConfigurationError::new("database port must be positive"));
        }

        if self.step_timeout_secs == 0 {
            return Err(ConfigurationError::new("step timeout must be positive"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigurationError::new("retry attempts must be at least 1"));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::new(
                "retry backoff multiplier must be at least 1.0",
            ));
        }

        SubnetLayout::plan(&self.network_cidr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn valid() -> ProvisionConfig {
        let mut config = ProvisionConfig::default();
        config.instance.image_id = "ami-0c55b159cbfafe1f0".to_string();
        config.database.master_password = "s3cret-pass".to_string();
        config
    }

    #[test]
    fn test_defaults_need_image_and_password() {
        let err = ProvisionConfig::default().validate().unwrap_err();
        assert!(err.message().contains("image id"));

        let mut config = ProvisionConfig::default();
        config.instance.image_id = "ami-1".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.message().contains("password"));

        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_zone_defaults_to_region() {
        let mut config = valid();
        config.region = "eu-central-1".to_string();
        assert_eq!(config.availability_zone(), "eu-central-1a");

        config.availability_zone = Some("eu-central-1c".to_string());
        assert_eq!(config.availability_zone(), "eu-central-1c");
    }

    #[test]
    fn test_yaml_partial_override() {
        let config = ProvisionConfig::from_yaml(
            r"
region: us-west-2
network_cidr: 172.16.0.0/16
instance:
  image_id: ami-abc
  key_name: ops
database:
  master_password: hunter22
  allocated_storage_gb: 50
retry:
  max_attempts: 5
",
        )
        .unwrap();

        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.instance.instance_type, "t2.micro");
        assert_eq!(config.instance.key_name.as_deref(), Some("ops"));
        assert_eq!(config.database.allocated_storage_gb, 50);
        assert_eq!(config.database.engine, "mysql");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry_config().initial_delay, Duration::from_secs(2));

        let layout = config.validate().unwrap();
        assert_eq!(layout.public.to_string(), "172.16.2.0/24");
    }

    #[test]
    fn test_yaml_unknown_shape_is_rejected() {
        assert!(ProvisionConfig::from_yaml("retry: three").is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = valid();
        config.network_cidr = "10.0.0.0/24".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.instance.ssh_cidr = "my-laptop".to_string();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.step_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.names.database_security_group = config.names.instance_security_group.clone();
        assert!(config.validate().is_err());

        let mut config = valid();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("s3cret-pass"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bastion.yaml");
        std::fs::write(&path, "region: ap-south-1\n").unwrap();

        let config = ProvisionConfig::load(&path).unwrap();
        assert_eq!(config.region, "ap-south-1");

        let missing = dir.path().join("missing.yaml");
        assert!(ProvisionConfig::load(&missing).is_err());
    }
}
