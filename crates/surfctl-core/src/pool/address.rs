use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// An IPv4 network in `a.b.c.d/len` notation, normalized to its network
/// address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix_len: u8,
}

impl Ipv4Cidr {
    /// Longest prefix that still leaves two usable hosts.
    pub const MAX_PREFIX_LEN: u8 = 30;

    /// `10.48.99.0/24`
    pub const DEFAULT_UE_POOL: Self = Self {
        network: Ipv4Addr::new(10, 48, 99, 0),
        prefix_len: 24,
    };

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    fn host_mask(&self) -> u32 {
        u32::MAX.checked_shr(u32::from(self.prefix_len)).unwrap_or(0)
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | self.host_mask())
    }

    pub fn first_host(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) + 1)
    }

    pub fn last_host(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.broadcast()) - 1)
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & !self.host_mask() == u32::from(self.network)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = CoreError;

    fn from_str(cidr: &str) -> Result<Self, Self::Err> {
        let (host, prefix) = cidr
            .trim()
            .split_once('/')
            .ok_or_else(|| CoreError::validation(format!("invalid IPv4 network '{cidr}'")))?;
        let host_ip = host
            .parse::<Ipv4Addr>()
            .map_err(|_| CoreError::validation(format!("invalid IPv4 address '{host}'")))?;
        let prefix_len = prefix
            .parse::<u8>()
            .map_err(|_| CoreError::validation(format!("invalid IPv4 prefix length '{prefix}'")))?;
        if prefix_len > Self::MAX_PREFIX_LEN {
            return Err(CoreError::validation(format!(
                "UE pool prefix length must be <= {}, got {prefix_len}",
                Self::MAX_PREFIX_LEN
            )));
        }

        let mask = u32::MAX.checked_shl(u32::from(32 - prefix_len)).unwrap_or(0);
        Ok(Self {
            network: Ipv4Addr::from(u32::from(host_ip) & mask),
            prefix_len,
        })
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(cidr: Ipv4Cidr) -> Self {
        cidr.to_string()
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_valid_input() {
        let cidr: Ipv4Cidr = "10.48.99.0/24".parse().expect("valid CIDR");
        assert_eq!(cidr.network(), Ipv4Addr::new(10, 48, 99, 0));
        assert_eq!(cidr.first_host(), Ipv4Addr::new(10, 48, 99, 1));
        assert_eq!(cidr.last_host(), Ipv4Addr::new(10, 48, 99, 254));
        assert_eq!(cidr.broadcast(), Ipv4Addr::new(10, 48, 99, 255));
    }

    #[test]
    fn parse_normalizes_host_bits() {
        let cidr: Ipv4Cidr = "10.48.99.17/24".parse().expect("valid CIDR");
        assert_eq!(cidr.to_string(), "10.48.99.0/24");
        assert!(cidr.contains(Ipv4Addr::new(10, 48, 99, 200)));
        assert!(!cidr.contains(Ipv4Addr::new(10, 48, 100, 1)));
    }

    #[test]
    fn parse_rejects_invalid_prefix() {
        assert!("10.0.0.0/31".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0.0/40".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn parse_rejects_missing_prefix() {
        assert!("10.0.0.0".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn zero_prefix_spans_everything() {
        let cidr: Ipv4Cidr = "0.0.0.0/0".parse().expect("valid CIDR");
        assert_eq!(cidr.broadcast(), Ipv4Addr::BROADCAST);
        assert!(cidr.contains(Ipv4Addr::new(8, 8, 8, 8)));
    }
}
