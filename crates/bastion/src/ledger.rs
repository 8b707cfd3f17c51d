//! Resource ledger for a provisioning run.
//!
//! The ledger is the only record of what a run created. A record is
//! appended right after its creation call succeeds and is never changed
//! afterwards; rollback walks the ledger backwards.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigurationError;

/// Kinds of resources the provisioner creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Network,
    Gateway,
    Subnet,
    RouteTable,
    SecurityGroup,
    ComputeInstance,
    DatabaseSubnetGroup,
    DatabaseInstance,
}

impl ResourceKind {
    /// Every kind, in the order a full run first creates them.
    pub const ALL: [Self; 8] = [
        Self::Network,
        Self::Gateway,
        Self::Subnet,
        Self::RouteTable,
        Self::SecurityGroup,
        Self::ComputeInstance,
        Self::DatabaseSubnetGroup,
        Self::DatabaseInstance,
    ];

    /// Stable name used on the command line and in ledger files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Gateway => "gateway",
            Self::Subnet => "subnet",
            Self::RouteTable => "route-table",
            Self::SecurityGroup => "security-group",
            Self::ComputeInstance => "compute-instance",
            Self::DatabaseSubnetGroup => "database-subnet-group",
            Self::DatabaseInstance => "database-instance",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|k| k.as_str()).collect();
                ConfigurationError::new(format!(
                    "unknown resource kind '{s}' (expected one of: {})",
                    known.join(", ")
                ))
            })
    }
}

/// A resource created by a run, with the identifier its teardown needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ResourceRecord {
    Network { id: String },
    /// Detaching needs the owning network as well as the gateway.
    Gateway { id: String, network_id: String },
    Subnet { id: String },
    RouteTable { id: String },
    SecurityGroup { id: String },
    ComputeInstance { id: String },
    DatabaseSubnetGroup { id: String },
    DatabaseInstance { id: String },
}

impl ResourceRecord {
    /// Build a record from a kind and its textual identifier.
    ///
    /// Gateway identifiers take the form `<gateway-id>:<network-id>`.
    ///
    /// # Errors
    /// Returns an error if the identifier is empty or malformed for `kind`.
    pub fn new(kind: ResourceKind, identifier: &str) -> Result<Self, ConfigurationError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ConfigurationError::new(format!(
                "empty identifier for {kind}"
            )));
        }
        let id = identifier.to_string();

        Ok(match kind {
            ResourceKind::Network => Self::Network { id },
            ResourceKind::Gateway => {
                let (gateway, network) = identifier
                    .split_once(':')
                    .filter(|(g, n)| !g.is_empty() && !n.is_empty())
                    .ok_or_else(|| {
                        ConfigurationError::new(format!(
                            "gateway identifier '{identifier}' must be <gateway-id>:<network-id>"
                        ))
                    })?;
                Self::Gateway {
                    id: gateway.to_string(),
                    network_id: network.to_string(),
                }
            }
            ResourceKind::Subnet => Self::Subnet { id },
            ResourceKind::RouteTable => Self::RouteTable { id },
            ResourceKind::SecurityGroup => Self::SecurityGroup { id },
            ResourceKind::ComputeInstance => Self::ComputeInstance { id },
            ResourceKind::DatabaseSubnetGroup => Self::DatabaseSubnetGroup { id },
            ResourceKind::DatabaseInstance => Self::DatabaseInstance { id },
        })
    }

    /// Kind of the recorded resource.
    #[must_use]
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Network { .. } => ResourceKind::Network,
            Self::Gateway { .. } => ResourceKind::Gateway,
            Self::Subnet { .. } => ResourceKind::Subnet,
            Self::RouteTable { .. } => ResourceKind::RouteTable,
            Self::SecurityGroup { .. } => ResourceKind::SecurityGroup,
            Self::ComputeInstance { .. } => ResourceKind::ComputeInstance,
            Self::DatabaseSubnetGroup { .. } => ResourceKind::DatabaseSubnetGroup,
            Self::DatabaseInstance { .. } => ResourceKind::DatabaseInstance,
        }
    }

    /// Provider identifier of the resource itself.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Network { id }
            | Self::Gateway { id, .. }
            | Self::Subnet { id }
            | Self::RouteTable { id }
            | Self::SecurityGroup { id }
            | Self::ComputeInstance { id }
            | Self::DatabaseSubnetGroup { id }
            | Self::DatabaseInstance { id } => id,
        }
    }
}

/// Formats as `kind=identifier`, the same form `FromStr` accepts.
impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gateway { id, network_id } => write!(f, "gateway={id}:{network_id}"),
            other => write!(f, "{}={}", other.kind(), other.id()),
        }
    }
}

impl FromStr for ResourceRecord {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, identifier) = s.split_once('=').ok_or_else(|| {
            ConfigurationError::new(format!("resource '{s}' must be written as <kind>=<id>"))
        })?;
        Self::new(kind.trim().parse()?, identifier)
    }
}

/// Ordered, append-only list of resources created by one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLedger {
    records: Vec<ResourceRecord>,
}

impl ResourceLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record for a resource whose creation just succeeded.
    pub fn record(&mut self, record: ResourceRecord) {
        info!(resource = %record, position = self.records.len() + 1, "Recorded resource");
        self.records.push(record);
    }

    /// Number of recorded resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.records.iter()
    }

    /// Kinds of the records in creation order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ResourceKind> {
        self.records.iter().map(ResourceRecord::kind).collect()
    }

    /// Consume the ledger, yielding records last-created first.
    pub fn into_teardown_order(self) -> impl Iterator<Item = ResourceRecord> {
        self.records.into_iter().rev()
    }

    /// Parse a ledger from YAML.
    ///
    /// # Errors
    /// Returns an error if the document is not a valid ledger.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigurationError> {
        let ledger: Self = serde_yaml::from_str(content)
            .map_err(|e| ConfigurationError::new(format!("failed to parse ledger: {e}")))?;

        for record in &ledger.records {
            if record.id().trim().is_empty() {
                return Err(ConfigurationError::new(format!(
                    "empty identifier for {} in ledger",
                    record.kind()
                )));
            }
        }
        Ok(ledger)
    }

    /// Load a hand-written ledger file (records in creation order).
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigurationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigurationError::new(format!("failed to read ledger {}: {e}", path.display()))
        })?;
        Self::from_yaml(&content)
    }
}

impl FromIterator<ResourceRecord> for ResourceLedger {
    fn from_iter<I: IntoIterator<Item = ResourceRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

impl Extend<ResourceRecord> for ResourceLedger {
    fn extend<I: IntoIterator<Item = ResourceRecord>>(&mut self, iter: I) {
        self.records.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_record() {
        let record: ResourceRecord = "subnet=subnet-0a1b".parse().unwrap();
        assert_eq!(
            record,
            ResourceRecord::Subnet {
                id: "subnet-0a1b".into()
            }
        );
        assert_eq!(record.kind(), ResourceKind::Subnet);
        assert_eq!(record.to_string(), "subnet=subnet-0a1b");
    }

    #[test]
    fn test_parse_gateway_record() {
        let record: ResourceRecord = "gateway=igw-1:vpc-2".parse().unwrap();
        assert_eq!(
            record,
            ResourceRecord::Gateway {
                id: "igw-1".into(),
                network_id: "vpc-2".into()
            }
        );
        assert_eq!(record.id(), "igw-1");
        assert_eq!(record.to_string(), "gateway=igw-1:vpc-2");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!("subnet".parse::<ResourceRecord>().is_err());
        assert!("subnet=".parse::<ResourceRecord>().is_err());
        assert!("bucket=my-bucket".parse::<ResourceRecord>().is_err());
        assert!("gateway=igw-1".parse::<ResourceRecord>().is_err());
        assert!("gateway=igw-1:".parse::<ResourceRecord>().is_err());
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_teardown_order_is_reverse() {
        let mut ledger = ResourceLedger::new();
        ledger.record(ResourceRecord::Network { id: "vpc-1".into() });
        ledger.record(ResourceRecord::Subnet {
            id: "subnet-1".into(),
        });
        ledger.record(ResourceRecord::RouteTable { id: "rtb-1".into() });

        let ids: Vec<String> = ledger
            .into_teardown_order()
            .map(|r| r.id().to_string())
            .collect();
        assert_eq!(ids, vec!["rtb-1", "subnet-1", "vpc-1"]);
    }

    #[test]
    fn test_ledger_from_yaml() {
        let yaml = r"
records:
  - kind: network
    id: vpc-1
  - kind: gateway
    id: igw-1
    network_id: vpc-1
  - kind: database-subnet-group
    id: bastion-subnet-group
";
        let ledger = ResourceLedger::from_yaml(yaml).unwrap();
        assert_eq!(
            ledger.kinds(),
            vec![
                ResourceKind::Network,
                ResourceKind::Gateway,
                ResourceKind::DatabaseSubnetGroup
            ]
        );
    }

    #[test]
    fn test_ledger_from_yaml_rejects_unknown_kind() {
        let yaml = "records:\n  - kind: bucket\n    id: my-bucket\n";
        assert!(ResourceLedger::from_yaml(yaml).is_err());
    }
}
