//! AWS (Amazon Web Services) infrastructure provider.
//!
//! Implements the [`InfraProvider`](crate::InfraProvider) trait for AWS.
//!
//! ## Services
//!
//! - **EC2** - VPCs, internet gateways, subnets, route tables, security
//!   groups and instances
//! - **RDS** - DB subnet groups and DB instances

mod client;
mod models;

pub use client::Aws;
pub use models::*;
