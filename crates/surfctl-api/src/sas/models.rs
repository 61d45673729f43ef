// ── SAS portal wire types ──
//
// Field names follow the portal's camelCase JSON. Every field is optional
// or defaulted: the portal omits empty values, and a partially-populated
// device is still useful for status display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device registration states reported by the portal.
pub mod device_state {
    pub const UNSPECIFIED: &str = "DEVICE_STATE_UNSPECIFIED";
    pub const RESERVED: &str = "RESERVED";
    pub const REGISTERED: &str = "REGISTERED";
    pub const DEREGISTERED: &str = "DEREGISTERED";
}

/// Grant states reported by the portal.
pub mod grant_state {
    pub const UNSPECIFIED: &str = "GRANT_STATE_UNSPECIFIED";
    pub const GRANTED: &str = "GRANT_STATE_GRANTED";
    pub const AUTHORIZED: &str = "GRANT_STATE_AUTHORIZED";
    pub const SUSPENDED: &str = "GRANT_STATE_SUSPENDED";
    pub const TERMINATED: &str = "GRANT_STATE_TERMINATED";
    pub const EXPIRED: &str = "GRANT_STATE_EXPIRED";
}

/// A CBSD (radio node) as listed under a customer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SasDevice {
    /// Resource name, e.g. `customers/123/devices/456`.
    pub name: String,
    pub serial_number: String,
    pub fcc_id: String,
    pub display_name: String,
    pub state: Option<String>,
    pub grants: Vec<SasGrant>,
}

/// A spectrum grant held by a device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SasGrant {
    pub grant_id: String,
    pub state: Option<String>,
    pub frequency_range: Option<FrequencyRange>,
    pub max_eirp: Option<f64>,
    /// `GAA` or `PAL`.
    pub channel_type: Option<String>,
    pub expire_time: Option<DateTime<Utc>>,
    pub last_state_change_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrequencyRange {
    pub low_frequency_mhz: Option<f64>,
    pub high_frequency_mhz: Option<f64>,
}

/// One page of `GET {customer}/devices`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct DeviceListPage {
    pub devices: Vec<SasDevice>,
    pub next_page_token: Option<String>,
}
