// ── Radio-node domain types ──
//
// A radio node (eNodeB / CBSD) is observed through two independent feeds:
// the MME signaling link and the SAS spectrum portal. `LinkEntry` and
// `SasEntry` are one feed's view of one node; `RadioNode` is the merged
// record the reconciler publishes.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

// ── Enums ────────────────────────────────────────────────────────────

/// Registration state of a node with the spectrum access system.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum SasState {
    #[default]
    Unregistered,
    Registered,
    Authorized,
    Suspended,
    Terminated,
}

/// Lifecycle state of a single spectrum grant.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum GrantState {
    Granted,
    Authorized,
    Suspended,
    Terminated,
    Expired,
    #[default]
    Unknown,
}

/// CBRS channel tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
pub enum ChannelType {
    Gaa,
    Pal,
}

// ── Grants ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyRange {
    pub low_mhz: f64,
    pub high_mhz: f64,
}

/// A spectrum grant as reported by the SAS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grant {
    pub grant_id: String,
    pub state: GrantState,
    pub frequency: Option<FrequencyRange>,
    pub channel_type: Option<ChannelType>,
    pub max_eirp_dbm: Option<f64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub state_changed_at: Option<DateTime<Utc>>,
}

impl Grant {
    /// Only authorized grants allow transmission.
    pub fn is_active(&self) -> bool {
        self.state == GrantState::Authorized
    }

    /// Same grant in the same state. Timestamps and EIRP drift between polls
    /// without constituting a transition.
    pub fn same_as(&self, other: &Grant) -> bool {
        self.grant_id == other.grant_id && self.state == other.state
    }
}

/// A grant that stopped being the node's active grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantRecord {
    pub grant: Grant,
    /// Node registration state while the grant was active.
    pub sas_state: SasState,
    pub superseded_at: DateTime<Utc>,
}

// ── Feed entries ─────────────────────────────────────────────────────

/// One node as seen by the signaling-link feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEntry {
    pub serial_number: String,
    pub ip: Ipv4Addr,
    pub connected: bool,
    pub connected_at: Option<DateTime<Utc>>,
}

/// One node as seen by the spectrum feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SasEntry {
    pub serial_number: String,
    pub sas_state: SasState,
    pub grants: Vec<Grant>,
    pub fcc_id: Option<String>,
}

// ── Merged node ──────────────────────────────────────────────────────

/// Merged record for one radio node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadioNode {
    pub serial_number: String,
    /// Operator-assigned name from the inventory.
    pub name: Option<String>,
    pub location: Option<String>,
    /// Whether the node is listed in the configured inventory.
    pub managed: bool,
    pub link_connected: bool,
    pub link_ip: Option<Ipv4Addr>,
    pub connected_at: Option<DateTime<Utc>>,
    pub sas_state: SasState,
    pub fcc_id: Option<String>,
    pub active_grant: Option<Grant>,
    /// Superseded grants, most recent first.
    pub grant_history: Vec<GrantRecord>,
}

impl RadioNode {
    pub fn new(serial_number: impl Into<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
            name: None,
            location: None,
            managed: false,
            link_connected: false,
            link_ip: None,
            connected_at: None,
            sas_state: SasState::default(),
            fcc_id: None,
            active_grant: None,
            grant_history: Vec::new(),
        }
    }

    /// Inventory name, falling back to the serial number.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.serial_number)
    }

    /// Linked to the core and cleared to transmit.
    pub fn is_operational(&self) -> bool {
        self.link_connected && self.active_grant.is_some()
    }

    /// Derive grant and registration transitions from retained history,
    /// oldest first.
    pub fn state_changes(&self) -> Vec<StateChange> {
        struct Observation<'a> {
            grant: Option<&'a Grant>,
            sas_state: SasState,
            ended_at: Option<DateTime<Utc>>,
        }

        let mut observations: Vec<Observation<'_>> = self
            .grant_history
            .iter()
            .rev()
            .map(|r| Observation {
                grant: Some(&r.grant),
                sas_state: r.sas_state,
                ended_at: Some(r.superseded_at),
            })
            .collect();
        observations.push(Observation {
            grant: self.active_grant.as_ref(),
            sas_state: self.sas_state,
            ended_at: None,
        });

        let mut changes = Vec::new();
        for pair in observations.windows(2) {
            let [prev, next] = pair else { continue };
            let Some(at) = prev.ended_at else { continue };

            if prev.sas_state != next.sas_state {
                changes.push(StateChange {
                    at,
                    kind: ChangeKind::Registration,
                    grant_id: None,
                    from: prev.sas_state.to_string(),
                    to: next.sas_state.to_string(),
                });
            }

            let same_grant = match (prev.grant, next.grant) {
                (Some(a), Some(b)) => a.same_as(b),
                (None, None) => true,
                _ => false,
            };
            if !same_grant {
                changes.push(StateChange {
                    at,
                    kind: ChangeKind::Grant,
                    grant_id: next.grant.or(prev.grant).map(|g| g.grant_id.clone()),
                    from: describe(prev.grant),
                    to: describe(next.grant),
                });
            }
        }
        changes
    }
}

fn describe(grant: Option<&Grant>) -> String {
    match grant {
        Some(g) => format!("{} {}", g.grant_id, g.state),
        None => "none".into(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeKind {
    Registration,
    Grant,
}

/// A single derived transition for a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub at: DateTime<Utc>,
    pub kind: ChangeKind,
    pub grant_id: Option<String>,
    pub from: String,
    pub to: String,
}

// ── Published view ───────────────────────────────────────────────────

/// Outcome of the last fetch from one feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FeedStatus {
    /// No reconciliation cycle has completed yet.
    #[default]
    Pending,
    Available,
    Unavailable {
        reason: String,
    },
    NotConfigured,
}

impl FeedStatus {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }
}

impl std::fmt::Display for FeedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Available => f.write_str("available"),
            Self::Unavailable { reason } => write!(f, "unavailable ({reason})"),
            Self::NotConfigured => f.write_str("not configured"),
        }
    }
}

/// Everything one reconciliation cycle produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadioView {
    pub refreshed_at: Option<DateTime<Utc>>,
    pub link: FeedStatus,
    pub sas: FeedStatus,
    pub nodes: BTreeMap<String, RadioNode>,
}

impl RadioView {
    pub fn node(&self, serial_number: &str) -> Option<&RadioNode> {
        self.nodes.get(serial_number)
    }

    /// At least one feed failed during the cycle that produced this view.
    pub fn is_partial(&self) -> bool {
        matches!(self.link, FeedStatus::Unavailable { .. })
            || matches!(self.sas, FeedStatus::Unavailable { .. })
    }

    pub fn summary(&self) -> RadioSummary {
        let nodes = self.nodes.values();
        RadioSummary {
            total: self.nodes.len(),
            link_connected: nodes.clone().filter(|n| n.link_connected).count(),
            sas_authorized: nodes
                .clone()
                .filter(|n| n.sas_state == SasState::Authorized)
                .count(),
            operational: nodes.filter(|n| n.is_operational()).count(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RadioSummary {
    pub total: usize,
    pub link_connected: usize,
    pub sas_authorized: usize,
    pub operational: usize,
}
