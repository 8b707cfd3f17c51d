//! Bastion environment provisioning with automatic rollback.
//!
//! A run creates a network, an internet gateway, two private and one public
//! subnet with their route tables, a security group and compute instance for
//! the bastion host, and a managed database reachable only from that host.
//! Every resource is recorded as soon as it exists; if any step fails, the
//! recorded resources are torn down in reverse order.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use bastion::{ProvisionConfig, Provisioner};
//! use bastion_cloud::aws::Aws;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = ProvisionConfig::default();
//!     config.instance.image_id = "ami-0c55b159cbfafe1f0".into();
//!     config.database.master_password = std::env::var("DB_PASSWORD")?;
//!
//!     let provider = Arc::new(Aws::new(&config.region)?);
//!     let outcome = Provisioner::new(provider, config).provision().await?;
//!     println!("bastion instance: {}", outcome.environment.instance_id);
//!     Ok(())
//! }
//! ```

pub mod compensator;
pub mod config;
pub mod error;
pub mod ledger;
pub mod network;
pub mod orchestrator;
pub mod state;

pub use compensator::{Compensator, RollbackReport};
pub use config::ProvisionConfig;
pub use error::{CompensationStepError, ConfigurationError, ProvisionError, ProvisioningStepError};
pub use ledger::{ResourceKind, ResourceLedger, ResourceRecord};
pub use orchestrator::{BastionEnvironment, ProvisionOutcome, Provisioner};
pub use state::{ProvisionStep, RetryConfig, RunState};
