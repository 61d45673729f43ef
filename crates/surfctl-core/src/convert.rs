// ── API-to-domain type conversions ──
//
// Bridges raw `surfctl_api` feed types into canonical `surfctl_core::model`
// types. The SAS portal reports device state and grant state separately;
// the node-level `SasState` is derived from both here.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use surfctl_api::mme::S1apConnection;
use surfctl_api::sas::models::{device_state, grant_state};
use surfctl_api::sas::{SasDevice, SasGrant};

use crate::model::{ChannelType, FrequencyRange, Grant, GrantState, LinkEntry, SasEntry, SasState};

impl GrantState {
    /// Parse a portal grant state, `GRANT_STATE_` prefix optional.
    pub fn from_portal(raw: &str) -> Self {
        if raw == grant_state::UNSPECIFIED {
            return Self::Unknown;
        }
        raw.strip_prefix("GRANT_STATE_")
            .unwrap_or(raw)
            .parse()
            .unwrap_or_default()
    }
}

impl From<SasGrant> for Grant {
    fn from(g: SasGrant) -> Self {
        let frequency = g.frequency_range.and_then(|r| match (r.low_frequency_mhz, r.high_frequency_mhz) {
            (Some(low), Some(high)) => Some(FrequencyRange {
                low_mhz: low,
                high_mhz: high,
            }),
            (Some(mhz), None) | (None, Some(mhz)) => Some(FrequencyRange {
                low_mhz: mhz,
                high_mhz: mhz,
            }),
            (None, None) => None,
        });

        Self {
            state: g.state.as_deref().map(GrantState::from_portal).unwrap_or_default(),
            grant_id: g.grant_id,
            frequency,
            channel_type: g.channel_type.as_deref().and_then(|c| c.parse::<ChannelType>().ok()),
            max_eirp_dbm: g.max_eirp,
            expires_at: g.expire_time,
            state_changed_at: g.last_state_change_time,
        }
    }
}

/// Node-level registration state from device state plus grant states.
pub fn derive_sas_state(device_state: Option<&str>, grants: &[Grant]) -> SasState {
    match device_state {
        Some(device_state::DEREGISTERED) => SasState::Terminated,
        Some(device_state::REGISTERED) => {
            if grants.iter().any(Grant::is_active) {
                SasState::Authorized
            } else if grants.iter().any(|g| g.state == GrantState::Suspended) {
                SasState::Suspended
            } else {
                SasState::Registered
            }
        }
        _ => SasState::Unregistered,
    }
}

impl From<SasDevice> for SasEntry {
    fn from(d: SasDevice) -> Self {
        let grants: Vec<Grant> = d.grants.into_iter().map(Grant::from).collect();
        Self {
            sas_state: derive_sas_state(d.state.as_deref(), &grants),
            serial_number: d.serial_number,
            grants,
            fcc_id: Some(d.fcc_id).filter(|f| !f.is_empty()),
        }
    }
}

/// Name for a link whose address is not in the inventory.
pub fn synthetic_serial(ip: Ipv4Addr) -> String {
    let [a, b, c, d] = ip.octets();
    format!("eNB-{a}-{b}-{c}-{d}")
}

/// Attribute each S1 association to a serial number via the inventory's
/// address map.
pub fn link_entries(
    connections: Vec<S1apConnection>,
    serial_by_ip: &HashMap<Ipv4Addr, String>,
) -> Vec<LinkEntry> {
    connections
        .into_iter()
        .map(|c| LinkEntry {
            serial_number: serial_by_ip
                .get(&c.ip)
                .cloned()
                .unwrap_or_else(|| synthetic_serial(c.ip)),
            ip: c.ip,
            connected: true,
            connected_at: c.connected_at,
        })
        .collect()
}
