// ── Subscriber domain types ──

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::network::{AuthKeys, Imsi, ServiceProfile};
use crate::error::CoreError;

/// A provisioned device record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriber {
    pub imsi: Imsi,
    pub name: String,
    pub ip: Ipv4Addr,
    pub profile: ServiceProfile,
    /// Records written before keys were stored read back with the defaults.
    #[serde(default)]
    pub security: AuthKeys,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which identity a new subscriber should receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityRequest {
    /// Next free suffix under the network prefix.
    Next,
    /// A specific suffix under the network prefix.
    Suffix(u16),
    /// A complete IMSI, possibly outside the network prefix.
    Imsi(Imsi),
}

impl FromStr for IdentityRequest {
    type Err = CoreError;

    /// Accepts `next`/`auto`, a 1-4 digit suffix, or a full 15-digit IMSI.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("next") || s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Next);
        }
        if (1..=4).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit()) {
            let suffix = s
                .parse()
                .map_err(|_| CoreError::validation(format!("invalid IMSI suffix '{s}'")))?;
            return Ok(Self::Suffix(suffix));
        }
        s.parse().map(Self::Imsi)
    }
}

impl fmt::Display for IdentityRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Next => f.write_str("next"),
            Self::Suffix(n) => write!(f, "{n:04}"),
            Self::Imsi(imsi) => imsi.fmt(f),
        }
    }
}

/// Input to [`SubscriberRegistry::provision`](crate::SubscriberRegistry::provision).
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub identity: IdentityRequest,
    /// Display name; defaults to `Device-NNNN`.
    pub name: Option<String>,
    /// Preferred address; the next free pool address otherwise.
    pub ip: Option<Ipv4Addr>,
}

impl ProvisionRequest {
    pub fn next() -> Self {
        Self {
            identity: IdentityRequest::Next,
            name: None,
            ip: None,
        }
    }

    pub fn with_identity(identity: IdentityRequest) -> Self {
        Self {
            identity,
            ..Self::next()
        }
    }
}

/// Mutable fields of an existing subscriber. The IMSI is immutable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberUpdate {
    pub name: Option<String>,
    pub ip: Option<Ipv4Addr>,
}

impl SubscriberUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.ip.is_none()
    }
}

/// Default display name derived from the last four IMSI digits.
pub fn default_name(imsi: &Imsi) -> String {
    let digits = imsi.as_str();
    let tail = digits.get(digits.len().saturating_sub(4)..).unwrap_or(digits);
    format!("Device-{tail}")
}
