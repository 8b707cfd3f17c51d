//! Infrastructure provider abstractions.
//!
//! This module defines the capability trait the provisioner drives and the
//! providers implementing it.

pub mod aws;
pub mod memory;
mod traits;

pub use traits::{
    CloudProviderError, CreateDatabaseRequest, InfraProvider, IngressRule, LaunchInstanceRequest,
    Route, RuleSource, SecurityGroupRequest,
};

// Re-export provider clients
pub use aws::Aws;
pub use memory::InMemoryProvider;
