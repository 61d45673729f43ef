//! Configuration for surfctl.
//!
//! One TOML file plus `SURFCTL_`-prefixed environment overrides, SAS token
//! resolution (env + keyring + plaintext), and translation into the
//! runtime types `surfctl_core` consumes. Nested keys are addressed from
//! the environment with a double underscore: `SURFCTL_SAS__CUSTOMER_ID`.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use surfctl_core::{
    AuthKeys, DEFAULT_K, DEFAULT_OPC, HistoryRetention, ImsiPrefix, InventoryEntry, Ipv4Cidr,
    NetworkIdentity, ReconcilerConfig, RegistryConfig, ServiceProfile,
};

/// Keyring service name for stored secrets.
pub const KEYRING_SERVICE: &str = "surfctl";
const SAS_TOKEN_KEY: &str = "sas/token";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.to_string(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub network: NetworkSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub mme: MmeSection,

    #[serde(default)]
    pub sas: SasSection,

    #[serde(default)]
    pub reconcile: ReconcileSection,

    /// Radio-node inventory.
    #[serde(default)]
    pub enodebs: Vec<EnodebEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

/// PLMN identity, UE pool and the QoS profile stamped on new subscribers.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkSection {
    pub mcc: String,
    pub mnc: String,
    /// 11-digit prefix; every IMSI is this plus a 4-digit suffix.
    pub imsi_prefix: String,
    pub default_apn: String,
    /// UE address pool in CIDR notation.
    pub ue_pool: String,
    pub ue_gateway: Option<Ipv4Addr>,
    pub qci: u8,
    pub arp_priority: u8,
    pub ambr_uplink_mbps: u64,
    pub ambr_downlink_mbps: u64,
    /// Subscriber key `K` (32 hex characters) written to new records.
    pub k: String,
    /// Operator key `OPc` (32 hex characters) written to new records.
    pub opc: String,
}

impl NetworkSection {
    /// PLMN digits right-padded with zeros to the 11-digit prefix length.
    pub fn prefix_for(mcc: &str, mnc: &str) -> String {
        format!("{:0<11}", format!("{mcc}{mnc}"))
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        let identity = NetworkIdentity::default();
        let profile = ServiceProfile::default();
        Self {
            mcc: identity.mcc,
            mnc: identity.mnc,
            imsi_prefix: identity.imsi_prefix.to_string(),
            default_apn: profile.apn,
            ue_pool: Ipv4Cidr::DEFAULT_UE_POOL.to_string(),
            ue_gateway: Some(Ipv4Addr::new(10, 48, 99, 1)),
            qci: profile.qci,
            arp_priority: profile.arp_priority,
            ambr_uplink_mbps: profile.ambr_uplink_bps / 1_000_000,
            ambr_downlink_mbps: profile.ambr_downlink_bps / 1_000_000,
            k: DEFAULT_K.into(),
            opc: DEFAULT_OPC.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StoreSection {
    /// Directory of subscriber records. Defaults to the platform data dir.
    pub path: Option<PathBuf>,
    /// Last merged radio view, reloaded by the next invocation.
    pub view_cache: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MmeSection {
    /// MME log to derive S1 link state from. Unset disables the link feed.
    pub log_path: Option<PathBuf>,
    pub tail_lines: usize,
}

impl Default for MmeSection {
    fn default() -> Self {
        Self {
            log_path: Some(PathBuf::from("/var/log/open5gs/mme.log")),
            tail_lines: 2000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SasSection {
    pub base_url: String,
    /// Portal customer resource (`customers/<id>`). Unset disables the feed.
    pub customer_id: Option<String>,
    /// Environment variable holding the bearer token.
    pub token_env: Option<String>,
    /// Bearer token (plaintext -- prefer keyring or env var).
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SasSection {
    fn default() -> Self {
        Self {
            base_url: "https://sasportal.googleapis.com/v1alpha1/".into(),
            customer_id: None,
            token_env: Some("SURFCTL_SAS_TOKEN".into()),
            token: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconcileSection {
    pub interval_secs: u64,
    pub feed_timeout_secs: u64,
    pub grant_history_hours: u32,
    pub grant_history_max: usize,
}

impl Default for ReconcileSection {
    fn default() -> Self {
        Self {
            interval_secs: 120,
            feed_timeout_secs: 10,
            grant_history_hours: 24,
            grant_history_max: 64,
        }
    }
}

/// One inventory radio node.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnodebEntry {
    pub serial_number: String,
    pub name: Option<String>,
    pub location: Option<String>,
    /// S1 source address, when known.
    pub ip: Option<Ipv4Addr>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

// ── Translation to core types ───────────────────────────────────────

impl Config {
    /// Registry parameters, validated.
    pub fn registry_config(&self) -> Result<RegistryConfig, ConfigError> {
        let net = &self.network;
        let prefix: ImsiPrefix = net
            .imsi_prefix
            .parse()
            .map_err(|e| invalid("network.imsi_prefix", e))?;
        let network =
            NetworkIdentity::new(&net.mcc, &net.mnc, prefix).map_err(|e| invalid("network", e))?;
        let ue_pool: Ipv4Cidr = net.ue_pool.parse().map_err(|e| invalid("network.ue_pool", e))?;

        if let Some(gateway) = net.ue_gateway {
            if !ue_pool.contains(gateway) {
                return Err(invalid(
                    "network.ue_gateway",
                    format!("{gateway} is outside {ue_pool}"),
                ));
            }
        }
        if net.default_apn.trim().is_empty() {
            return Err(invalid("network.default_apn", "must not be empty"));
        }
        let security = AuthKeys::new(&net.k, &net.opc).map_err(|e| invalid("network.k/opc", e))?;

        Ok(RegistryConfig {
            network,
            profile: ServiceProfile {
                apn: net.default_apn.clone(),
                qci: net.qci,
                arp_priority: net.arp_priority,
                ambr_uplink_bps: net.ambr_uplink_mbps.saturating_mul(1_000_000),
                ambr_downlink_bps: net.ambr_downlink_mbps.saturating_mul(1_000_000),
            },
            security,
            ue_pool,
            ue_gateway: net.ue_gateway,
        })
    }

    /// Reconciler parameters with the enabled inventory nodes.
    pub fn reconciler_config(&self) -> Result<ReconcilerConfig, ConfigError> {
        let r = &self.reconcile;
        if r.interval_secs == 0 {
            return Err(invalid("reconcile.interval_secs", "must be greater than 0"));
        }
        if r.feed_timeout_secs == 0 {
            return Err(invalid("reconcile.feed_timeout_secs", "must be greater than 0"));
        }

        let mut seen = std::collections::BTreeSet::new();
        for e in &self.enodebs {
            if e.serial_number.trim().is_empty() {
                return Err(invalid("enodebs.serial_number", "must not be empty"));
            }
            if !seen.insert(e.serial_number.as_str()) {
                return Err(invalid(
                    "enodebs.serial_number",
                    format!("'{}' is listed twice", e.serial_number),
                ));
            }
        }

        Ok(ReconcilerConfig {
            interval: Duration::from_secs(r.interval_secs),
            feed_timeout: Duration::from_secs(r.feed_timeout_secs),
            retention: HistoryRetention::from_hours(r.grant_history_hours, r.grant_history_max),
            inventory: self.inventory(),
        })
    }

    /// Enabled inventory nodes.
    pub fn inventory(&self) -> Vec<InventoryEntry> {
        self.enodebs
            .iter()
            .filter(|e| e.enabled)
            .map(|e| InventoryEntry {
                serial_number: e.serial_number.clone(),
                name: e.name.clone(),
                location: e.location.clone(),
                ip: e.ip,
            })
            .collect()
    }

    /// Subscriber store directory.
    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .unwrap_or_else(|| data_dir().join("subscribers"))
    }

    /// Saved radio view.
    pub fn view_cache_path(&self) -> PathBuf {
        self.store
            .view_cache
            .clone()
            .unwrap_or_else(|| data_dir().join("radio-view.json"))
    }

    pub fn sas_base_url(&self) -> Result<url::Url, ConfigError> {
        self.sas
            .base_url
            .parse()
            .map_err(|e| invalid("sas.base_url", e))
    }

    pub fn sas_timeout(&self) -> Duration {
        Duration::from_secs(self.sas.timeout_secs)
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "waveriders", "surfctl")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Resolve the data directory (subscriber records live below it).
pub fn data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".local/share"),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

fn dirs_fallback(base: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(base);
    p.push("surfctl");
    p
}

// ── Loading & saving ────────────────────────────────────────────────

/// Load config from `path` (if it exists) layered over defaults, with
/// `SURFCTL_` environment overrides on top.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("SURFCTL_").split("__"));

    Ok(figment.extract()?)
}

/// Load from the canonical config path.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Serialize config to TOML at `path`, creating parent directories.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Set `enabled = false` on the inventory entry for `serial_number` in the
/// file at `path`. Other keys are rewritten as they were read, without
/// defaults or environment overrides. Returns whether an entry matched.
pub fn disable_enodeb(path: &Path, serial_number: &str) -> Result<bool, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    let mut doc: toml::Table = raw
        .parse()
        .map_err(|e: toml::de::Error| invalid("config file", e.message()))?;

    let Some(entries) = doc.get_mut("enodebs").and_then(toml::Value::as_array_mut) else {
        return Ok(false);
    };
    let mut matched = false;
    for entry in entries.iter_mut().filter_map(toml::Value::as_table_mut) {
        if entry.get("serial_number").and_then(toml::Value::as_str) == Some(serial_number) {
            entry.insert("enabled".into(), toml::Value::Boolean(false));
            matched = true;
        }
    }

    if matched {
        std::fs::write(path, toml::to_string_pretty(&doc)?)?;
        debug!(path = %path.display(), serial_number, "inventory node disabled");
    }
    Ok(matched)
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the SAS bearer token: env var, then system keyring, then
/// plaintext config. `None` when no source has one.
pub fn resolve_sas_token(sas: &SasSection) -> Option<SecretString> {
    // 1. Configured env var
    if let Some(ref env_name) = sas.token_env {
        if let Ok(val) = std::env::var(env_name) {
            if !val.is_empty() {
                return Some(SecretString::from(val));
            }
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, SAS_TOKEN_KEY) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    sas.token.clone().map(SecretString::from)
}

/// Store the SAS bearer token in the system keyring.
pub fn store_sas_token(token: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, SAS_TOKEN_KEY)?.set_password(token)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use figment::Jail;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn defaults_translate_to_core_defaults() {
        let cfg = Config::default();
        let registry = cfg.registry_config().unwrap();
        assert_eq!(registry.network, NetworkIdentity::default());
        assert_eq!(registry.profile, ServiceProfile::default());
        assert_eq!(registry.ue_pool, Ipv4Cidr::DEFAULT_UE_POOL);

        let reconciler = cfg.reconciler_config().unwrap();
        assert_eq!(reconciler.interval, Duration::from_secs(120));
        assert_eq!(reconciler.retention, HistoryRetention::default());
    }

    #[test]
    fn file_and_env_layer_over_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "surfctl.toml",
                r#"
                [network]
                imsi_prefix = "31501000001"

                [sas]
                customer_id = "customers/1"

                [[enodebs]]
                serial_number = "SN-100"
                name = "Warehouse North"
                ip = "10.48.0.159"

                [[enodebs]]
                serial_number = "SN-200"
                enabled = false
                "#,
            )?;
            jail.set_env("SURFCTL_SAS__CUSTOMER_ID", "customers/42");
            jail.set_env("SURFCTL_RECONCILE__INTERVAL_SECS", "30");

            let cfg = load_config_from(Path::new("surfctl.toml")).unwrap();
            assert_eq!(cfg.network.imsi_prefix, "31501000001");
            assert_eq!(cfg.network.mcc, "315");
            assert_eq!(cfg.sas.customer_id.as_deref(), Some("customers/42"));
            assert_eq!(cfg.reconcile.interval_secs, 30);

            let inventory = cfg.inventory();
            assert_eq!(inventory.len(), 1);
            assert_eq!(inventory[0].ip, Some(Ipv4Addr::new(10, 48, 0, 159)));
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = load_config_from(Path::new("/nonexistent/surfctl/config.toml")).unwrap();
        assert_eq!(cfg.reconcile.interval_secs, 120);
        assert_eq!(cfg.mme.tail_lines, 2000);
    }

    #[test]
    fn gateway_outside_pool_is_rejected() {
        let mut cfg = Config::default();
        cfg.network.ue_gateway = Some(Ipv4Addr::new(192, 168, 0, 1));
        let err = cfg.registry_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "network.ue_gateway"));
    }

    #[test]
    fn prefix_is_padded_from_plmn() {
        assert_eq!(NetworkSection::prefix_for("315", "010"), "31501000000");
        assert_eq!(NetworkSection::prefix_for("001", "01"), "00101000000");
    }

    #[test]
    fn short_prefix_is_rejected() {
        let mut cfg = Config::default();
        cfg.network.imsi_prefix = "315010".into();
        assert!(cfg.registry_config().is_err());
    }

    #[test]
    fn duplicate_inventory_serial_is_rejected() {
        let entry = EnodebEntry {
            serial_number: "SN-1".into(),
            name: None,
            location: None,
            ip: None,
            enabled: true,
        };
        let cfg = Config {
            enodebs: vec![entry.clone(), entry],
            ..Config::default()
        };
        assert!(cfg.reconciler_config().is_err());
    }

    #[test]
    fn save_then_load_preserves_sections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.sas.customer_id = Some("customers/7".into());

        save_config_to(&cfg, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.sas.customer_id.as_deref(), Some("customers/7"));
    }

    #[test]
    fn plaintext_token_is_last_resort() {
        let sas = SasSection {
            token_env: Some("SURFCTL_TEST_UNSET_TOKEN_VAR".into()),
            token: Some("plain".into()),
            ..SasSection::default()
        };
        assert!(resolve_sas_token(&sas).is_some());
    }

    #[test]
    fn disabled_enodeb_leaves_the_inventory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[network]\nmcc = \"001\"\nmnc = \"01\"\nimsi_prefix = \"00101000000\"\n\n\
             [[enodebs]]\nserial_number = \"SN-100\"\n\n\
             [[enodebs]]\nserial_number = \"SN-200\"\nname = \"Dock\"\n",
        )
        .unwrap();

        assert!(disable_enodeb(&path, "SN-200").unwrap());
        assert!(!disable_enodeb(&path, "SN-404").unwrap());

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.network.mcc, "001");
        assert_eq!(cfg.enodebs.len(), 2);
        assert_eq!(cfg.enodebs[1].name.as_deref(), Some("Dock"));
        let serials: Vec<String> = cfg.inventory().into_iter().map(|e| e.serial_number).collect();
        assert_eq!(serials, vec!["SN-100"]);
    }

    #[test]
    fn disable_enodeb_without_file_matches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!disable_enodeb(&dir.path().join("missing.toml"), "SN-100").unwrap());
    }

    #[test]
    fn malformed_key_is_rejected() {
        let mut cfg = Config::default();
        cfg.network.opc = "not-hex".into();
        let err = cfg.registry_config().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "network.k/opc"));
    }
}
