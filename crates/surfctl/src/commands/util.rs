//! Shared helpers for command handlers.

use std::io::IsTerminal;

use chrono::{DateTime, Utc};

use surfctl_config::Config;
use surfctl_core::{CoreError, Imsi, JsonFileStore, SubscriberRegistry};

use crate::error::CliError;

/// Open the subscriber registry over the configured JSON store.
pub async fn open_registry(cfg: &Config) -> Result<SubscriberRegistry<JsonFileStore>, CliError> {
    let registry_config = cfg.registry_config()?;
    let path = cfg.store_path();
    tracing::debug!(path = %path.display(), "opening subscriber store");
    let store = JsonFileStore::open(path).await.map_err(CoreError::from)?;
    Ok(SubscriberRegistry::open(store, registry_config).await?)
}

/// Parse a full IMSI argument.
pub fn parse_imsi(raw: &str) -> Result<Imsi, CliError> {
    raw.parse().map_err(|e: CoreError| CliError::Validation {
        field: "imsi".into(),
        reason: e.to_string(),
    })
}

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: message.trim_end_matches('?').into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(prompt_err)
}

/// Map a dialoguer failure into CliError.
pub fn prompt_err(e: dialoguer::Error) -> CliError {
    CliError::Io(std::io::Error::other(e))
}

/// Coarse age of a timestamp, e.g. `3m 12s ago`.
pub fn ago(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0).unsigned_abs();
    if secs == 0 {
        return "just now".into();
    }
    format!(
        "{} ago",
        humantime::format_duration(std::time::Duration::from_secs(secs))
    )
}

/// `-` for missing values in detail and table views.
pub fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".into(), |v| v.to_string())
}
