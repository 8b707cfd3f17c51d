//! Address planning for the bastion network.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::ConfigurationError;

/// Prefix length of every carved subnet.
pub const SUBNET_PREFIX: u8 = 24;

/// Widest network prefix that still leaves room for the three subnets.
pub const MAX_NETWORK_PREFIX: u8 = 22;

/// An IPv4 block in `a.b.c.d/n` form whose address is the network address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    address: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    /// Network address.
    #[must_use]
    pub fn address(self) -> Ipv4Addr {
        self.address
    }

    /// Prefix length.
    #[must_use]
    pub fn prefix(self) -> u8 {
        self.prefix
    }

    fn mask(prefix: u8) -> u32 {
        if prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(prefix))
        }
    }
}

impl FromStr for Ipv4Cidr {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix) = s
            .split_once('/')
            .ok_or_else(|| ConfigurationError::new(format!("'{s}' is not in a.b.c.d/n form")))?;
        let address: Ipv4Addr = address
            .parse()
            .map_err(|_| ConfigurationError::new(format!("'{s}' has an invalid IPv4 address")))?;
        let prefix: u8 = prefix
            .parse()
            .ok()
            .filter(|p| *p <= 32)
            .ok_or_else(|| ConfigurationError::new(format!("'{s}' has an invalid prefix length")))?;

        if u32::from(address) & !Self::mask(prefix) != 0 {
            return Err(ConfigurationError::new(format!(
                "'{s}' has host bits set; use the network address"
            )));
        }
        Ok(Self { address, prefix })
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

/// Subnet blocks carved out of the network block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetLayout {
    pub network: Ipv4Cidr,
    pub private: [Ipv4Cidr; 2],
    pub public: Ipv4Cidr,
}

impl SubnetLayout {
    /// Carve two private and one public /24 from `network_cidr`, in that order.
    ///
    /// # Errors
    /// Returns an error if the block is malformed or narrower than /22.
    pub fn plan(network_cidr: &str) -> Result<Self, ConfigurationError> {
        let network: Ipv4Cidr = network_cidr.parse()?;
        if network.prefix > MAX_NETWORK_PREFIX {
            return Err(ConfigurationError::new(format!(
                "network block {network} is too small; need at least a /{MAX_NETWORK_PREFIX}"
            )));
        }

        let base = u32::from(network.address);
        let carve = |index: u32| Ipv4Cidr {
            address: Ipv4Addr::from(base + (index << (32 - u32::from(SUBNET_PREFIX)))),
            prefix: SUBNET_PREFIX,
        };

        Ok(Self {
            network,
            private: [carve(0), carve(1)],
            public: carve(2),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = SubnetLayout::plan("10.0.0.0/16").unwrap();
        assert_eq!(layout.private[0].to_string(), "10.0.0.0/24");
        assert_eq!(layout.private[1].to_string(), "10.0.1.0/24");
        assert_eq!(layout.public.to_string(), "10.0.2.0/24");
    }

    #[test]
    fn test_layout_in_other_range() {
        let layout = SubnetLayout::plan("172.31.64.0/20").unwrap();
        assert_eq!(layout.private[0].to_string(), "172.31.64.0/24");
        assert_eq!(layout.public.to_string(), "172.31.66.0/24");
    }

    #[test]
    fn test_smallest_network_fits() {
        assert!(SubnetLayout::plan("192.168.4.0/22").is_ok());
        assert!(SubnetLayout::plan("192.168.4.0/23").is_err());
    }

    #[test]
    fn test_invalid_blocks_are_rejected() {
        for bad in [
            "",
            "10.0.0.0",
            "10.0.0/16",
            "10.0.0.300/16",
            "10.0.0.0/33",
            "10.0.0.0/x",
            "10.0.1.0/16",
        ] {
            assert!(SubnetLayout::plan(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_host_cidr_parses() {
        let cidr: Ipv4Cidr = "203.0.113.7/32".parse().unwrap();
        assert_eq!(cidr.prefix(), 32);
        let any: Ipv4Cidr = "0.0.0.0/0".parse().unwrap();
        assert_eq!(any.address(), Ipv4Addr::UNSPECIFIED);
    }
}
