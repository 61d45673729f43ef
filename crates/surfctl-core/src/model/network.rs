// ── Network identity domain types ──

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Digits in a full IMSI.
pub const IMSI_LEN: usize = 15;
/// Digits in the network-wide IMSI prefix.
pub const IMSI_PREFIX_LEN: usize = 11;

/// Lowest per-device suffix handed out under the prefix.
pub const SUFFIX_MIN: u16 = 1;
/// Highest per-device suffix handed out under the prefix.
pub const SUFFIX_MAX: u16 = 9999;

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

// ── Imsi ─────────────────────────────────────────────────────────────

/// A validated 15-digit subscriber identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Imsi(String);

impl Imsi {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 4-digit suffix, when this IMSI lives under `prefix`.
    pub fn suffix_under(&self, prefix: &ImsiPrefix) -> Option<u16> {
        let suffix = self.0.strip_prefix(prefix.as_str())?;
        suffix
            .parse::<u16>()
            .ok()
            .filter(|n| (SUFFIX_MIN..=SUFFIX_MAX).contains(n))
    }
}

impl FromStr for Imsi {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != IMSI_LEN || !all_digits(s) {
            return Err(CoreError::validation(format!(
                "IMSI must be exactly {IMSI_LEN} digits, got '{s}'"
            )));
        }
        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for Imsi {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Imsi> for String {
    fn from(imsi: Imsi) -> Self {
        imsi.0
    }
}

impl fmt::Display for Imsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── ImsiPrefix ───────────────────────────────────────────────────────

/// The 11-digit MCC+MNC+padding prefix shared by every provisioned device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImsiPrefix(String);

impl ImsiPrefix {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compose the full IMSI for a suffix in `SUFFIX_MIN..=SUFFIX_MAX`.
    pub fn imsi_for(&self, suffix: u16) -> Result<Imsi, CoreError> {
        if !(SUFFIX_MIN..=SUFFIX_MAX).contains(&suffix) {
            return Err(CoreError::validation(format!(
                "IMSI suffix must be between {SUFFIX_MIN} and {SUFFIX_MAX}, got {suffix}"
            )));
        }
        Ok(Imsi(format!("{}{suffix:04}", self.0)))
    }
}

impl FromStr for ImsiPrefix {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != IMSI_PREFIX_LEN || !all_digits(s) {
            return Err(CoreError::validation(format!(
                "IMSI prefix must be exactly {IMSI_PREFIX_LEN} digits, got '{s}'"
            )));
        }
        Ok(Self(s.to_owned()))
    }
}

impl TryFrom<String> for ImsiPrefix {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ImsiPrefix> for String {
    fn from(prefix: ImsiPrefix) -> Self {
        prefix.0
    }
}

impl fmt::Display for ImsiPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── NetworkIdentity ──────────────────────────────────────────────────

/// PLMN identity of the private network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkIdentity {
    pub mcc: String,
    pub mnc: String,
    pub imsi_prefix: ImsiPrefix,
}

impl NetworkIdentity {
    pub fn new(mcc: &str, mnc: &str, imsi_prefix: ImsiPrefix) -> Result<Self, CoreError> {
        if mcc.len() != 3 || !all_digits(mcc) {
            return Err(CoreError::validation(format!("MCC must be 3 digits, got '{mcc}'")));
        }
        if !(2..=3).contains(&mnc.len()) || !all_digits(mnc) {
            return Err(CoreError::validation(format!("MNC must be 2 or 3 digits, got '{mnc}'")));
        }
        let plmn = format!("{mcc}{mnc}");
        if !imsi_prefix.as_str().starts_with(&plmn) {
            return Err(CoreError::validation(format!(
                "IMSI prefix {imsi_prefix} does not start with PLMN {plmn}"
            )));
        }
        Ok(Self {
            mcc: mcc.to_owned(),
            mnc: mnc.to_owned(),
            imsi_prefix,
        })
    }

    /// MCC followed by MNC.
    pub fn plmn(&self) -> String {
        format!("{}{}", self.mcc, self.mnc)
    }
}

impl Default for NetworkIdentity {
    fn default() -> Self {
        Self {
            mcc: "315".into(),
            mnc: "010".into(),
            imsi_prefix: ImsiPrefix("31501000000".into()),
        }
    }
}

// ── ServiceProfile ───────────────────────────────────────────────────

/// QoS profile stamped onto every subscriber at provisioning time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProfile {
    pub apn: String,
    pub qci: u8,
    pub arp_priority: u8,
    pub ambr_uplink_bps: u64,
    pub ambr_downlink_bps: u64,
}

impl Default for ServiceProfile {
    fn default() -> Self {
        Self {
            apn: "internet".into(),
            qci: 9,
            arp_priority: 8,
            ambr_uplink_bps: 50_000_000,
            ambr_downlink_bps: 100_000_000,
        }
    }
}

// ── AuthKeys ─────────────────────────────────────────────────────────

/// Default subscriber key `K` shipped with the reference SIM profiles.
pub const DEFAULT_K: &str = "465B5CE8B199B49FAA5F0A2EE238A6BC";
/// Default derived operator key `OPc` matching [`DEFAULT_K`].
pub const DEFAULT_OPC: &str = "E8ED289DEBA952E4283B54E88E6183CA";
/// Authentication management field written with every record.
pub const DEFAULT_AMF: &str = "8000";

fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Milenage key material stored with a subscriber. Set at provisioning and
/// never changed by an update.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthKeys {
    pub k: String,
    pub opc: String,
    pub amf: String,
}

impl AuthKeys {
    /// Validate 128-bit `K` and `OPc` given as hex. Stored uppercase.
    pub fn new(k: &str, opc: &str) -> Result<Self, CoreError> {
        for (label, value) in [("K", k), ("OPc", opc)] {
            if !is_hex(value, 32) {
                return Err(CoreError::validation(format!(
                    "{label} must be 32 hex characters"
                )));
            }
        }
        Ok(Self {
            k: k.to_ascii_uppercase(),
            opc: opc.to_ascii_uppercase(),
            amf: DEFAULT_AMF.into(),
        })
    }

    /// Copy with both keys replaced by `****`, for display.
    #[must_use]
    pub fn masked(&self) -> Self {
        Self {
            k: "****".into(),
            opc: "****".into(),
            amf: self.amf.clone(),
        }
    }
}

impl Default for AuthKeys {
    fn default() -> Self {
        Self {
            k: DEFAULT_K.into(),
            opc: DEFAULT_OPC.into(),
            amf: DEFAULT_AMF.into(),
        }
    }
}

impl fmt::Debug for AuthKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthKeys")
            .field("k", &"****")
            .field("opc", &"****")
            .field("amf", &self.amf)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn imsi_requires_fifteen_digits() {
        assert!("315010000000001".parse::<Imsi>().is_ok());
        assert!("31501000000001".parse::<Imsi>().is_err());
        assert!("31501000000000a".parse::<Imsi>().is_err());
        assert!("".parse::<Imsi>().is_err());
    }

    #[test]
    fn prefix_composes_zero_padded_imsi() {
        let prefix: ImsiPrefix = "31501000000".parse().unwrap();
        assert_eq!(prefix.imsi_for(1).unwrap().as_str(), "315010000000001");
        assert_eq!(prefix.imsi_for(9999).unwrap().as_str(), "315010000009999");
        assert!(prefix.imsi_for(0).is_err());
        assert!(prefix.imsi_for(10_000).is_err());
    }

    #[test]
    fn suffix_only_under_matching_prefix() {
        let prefix: ImsiPrefix = "31501000000".parse().unwrap();
        let ours: Imsi = "315010000000042".parse().unwrap();
        let foreign: Imsi = "001010000000042".parse().unwrap();
        let zero: Imsi = "315010000000000".parse().unwrap();
        assert_eq!(ours.suffix_under(&prefix), Some(42));
        assert_eq!(foreign.suffix_under(&prefix), None);
        assert_eq!(zero.suffix_under(&prefix), None);
    }

    #[test]
    fn identity_rejects_prefix_outside_plmn() {
        let prefix: ImsiPrefix = "00101000000".parse().unwrap();
        assert!(NetworkIdentity::new("315", "010", prefix).is_err());
    }

    #[test]
    fn imsi_serializes_as_plain_string() {
        let imsi: Imsi = "315010000000001".parse().unwrap();
        assert_eq!(serde_json::to_string(&imsi).unwrap(), "\"315010000000001\"");
        assert!(serde_json::from_str::<Imsi>("\"12\"").is_err());
    }

    #[test]
    fn auth_keys_require_128_bit_hex() {
        let keys = AuthKeys::new(&DEFAULT_K.to_lowercase(), DEFAULT_OPC).unwrap();
        assert_eq!(keys, AuthKeys::default());
        assert!(AuthKeys::new("465B5CE8", DEFAULT_OPC).is_err());
        assert!(AuthKeys::new(DEFAULT_K, &"Z".repeat(32)).is_err());
    }

    #[test]
    fn auth_keys_never_debug_print_secrets() {
        let shown = format!("{:?}", AuthKeys::default());
        assert!(!shown.contains(DEFAULT_K));
        assert_eq!(AuthKeys::default().masked().k, "****");
    }
}
