//! Infrastructure provider integrations for the bastion provisioner.
//!
//! This crate exposes the capability interface the provisioner drives,
//! [`InfraProvider`], and two implementations of it:
//!
//! - **AWS** - EC2 networking and instances plus RDS databases
//! - **In-memory** - deterministic fake used for dry runs and tests
//!
//! Every `create_*` call returns an opaque identifier that callers hand back
//! unchanged to later calls and to the matching teardown call.

pub mod providers;

pub use providers::{
    aws, memory, CloudProviderError, CreateDatabaseRequest, InMemoryProvider, InfraProvider,
    IngressRule, LaunchInstanceRequest, Route, RuleSource, SecurityGroupRequest,
};
