// ── Runtime configuration ──
//
// These types describe how the registry and the reconciler behave. They
// never touch disk: surfctl-config loads files and hands these in.

use std::net::Ipv4Addr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::{AuthKeys, NetworkIdentity, ServiceProfile};
use crate::pool::Ipv4Cidr;

/// Inputs to [`SubscriberRegistry::open`](crate::SubscriberRegistry::open).
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub network: NetworkIdentity,
    pub profile: ServiceProfile,
    /// Key material stamped on new subscribers.
    pub security: AuthKeys,
    /// UE address pool.
    pub ue_pool: Ipv4Cidr,
    /// Packet gateway address; held permanently when inside `ue_pool`.
    pub ue_gateway: Option<Ipv4Addr>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            network: NetworkIdentity::default(),
            profile: ServiceProfile::default(),
            security: AuthKeys::default(),
            ue_pool: Ipv4Cidr::DEFAULT_UE_POOL,
            ue_gateway: Some(Ipv4Addr::new(10, 48, 99, 1)),
        }
    }
}

/// A radio node the operator expects to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    pub serial_number: String,
    pub name: Option<String>,
    pub location: Option<String>,
    /// S1 source address, used to attribute signaling links to this node.
    pub ip: Option<Ipv4Addr>,
}

/// How long superseded grants stay in a node's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryRetention {
    pub max_age: chrono::TimeDelta,
    pub max_entries: usize,
}

impl HistoryRetention {
    pub fn from_hours(hours: u32, max_entries: usize) -> Self {
        Self {
            max_age: chrono::TimeDelta::hours(i64::from(hours)),
            max_entries,
        }
    }
}

impl Default for HistoryRetention {
    fn default() -> Self {
        Self::from_hours(24, 64)
    }
}

/// Inputs to [`Reconciler::new`](crate::Reconciler::new).
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Period of the background refresh task.
    pub interval: Duration,
    /// Upper bound on a single feed fetch.
    pub feed_timeout: Duration,
    pub retention: HistoryRetention,
    /// Enabled inventory nodes. Empty means "every node the feeds report".
    pub inventory: Vec<InventoryEntry>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(120),
            feed_timeout: Duration::from_secs(10),
            retention: HistoryRetention::default(),
            inventory: Vec::new(),
        }
    }
}
