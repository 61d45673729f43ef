//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use surfctl_config::ConfigError;
use surfctl_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(surfctl::not_found),
        help("Run: surfctl {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("Subscriber {imsi} already exists")]
    #[diagnostic(
        code(surfctl::conflict),
        help("Pick another identity, or let the registry choose: surfctl subscribers add next")
    )]
    DuplicateSubscriber { imsi: String },

    #[error("Address {ip} is not available: {reason}")]
    #[diagnostic(
        code(surfctl::address_unavailable),
        help("Omit --ip to take the next free address from the UE pool.")
    )]
    AddressUnavailable { ip: String, reason: String },

    #[error("No free values left in the {pool} pool")]
    #[diagnostic(
        code(surfctl::pool_exhausted),
        help("Delete unused subscribers or widen network.ue_pool in the config file.")
    )]
    PoolExhausted { pool: String },

    // ── Feeds & storage ──────────────────────────────────────────────
    #[error("{feed} is unavailable: {reason}")]
    #[diagnostic(
        code(surfctl::feed_unavailable),
        help("Check [mme] log_path and [sas] settings, then retry with -v for details.")
    )]
    FeedUnavailable { feed: String, reason: String },

    #[error("{feed} is not configured")]
    #[diagnostic(code(surfctl::feed_not_configured), help("Configure it with: surfctl config init"))]
    FeedNotConfigured { feed: String },

    #[error("Subscriber store failure: {message}")]
    #[diagnostic(
        code(surfctl::store),
        help("The store directory is set by [store] path. The operation may succeed if retried.")
    )]
    Store { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(surfctl::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Invalid configuration: {field}: {reason}")]
    #[diagnostic(
        code(surfctl::config_invalid),
        help("Edit the config file shown by: surfctl config path")
    )]
    ConfigInvalid { field: String, reason: String },

    #[error(transparent)]
    #[diagnostic(code(surfctl::config))]
    Config(ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(surfctl::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Could not serialize output: {0}")]
    #[diagnostic(code(surfctl::serialize))]
    Serialize(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::DuplicateSubscriber { .. }
            | Self::AddressUnavailable { .. }
            | Self::PoolExhausted { .. } => exit_code::CONFLICT,
            Self::FeedUnavailable { .. } | Self::FeedNotConfigured { .. } => exit_code::CONNECTION,
            Self::Validation { .. }
            | Self::ConfigInvalid { .. }
            | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::DuplicateIdentity { imsi } => Self::DuplicateSubscriber { imsi },
            CoreError::AddressUnavailable { ip, reason } => Self::AddressUnavailable { ip, reason },
            CoreError::PoolExhausted { pool } => Self::PoolExhausted { pool },
            CoreError::NotFound { entity, identifier } => Self::NotFound {
                resource_type: entity.into(),
                list_command: match entity {
                    "radio node" => "enodebs status".into(),
                    _ => "subscribers list".into(),
                },
                identifier,
            },
            CoreError::StoreFailure { message } => Self::Store { message },
            CoreError::FeedUnavailable { feed, reason } => Self::FeedUnavailable { feed, reason },
            CoreError::FeedNotConfigured { feed } => Self::FeedNotConfigured { feed },
            CoreError::Validation { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Config { message } => Self::ConfigInvalid {
                field: "network".into(),
                reason: message,
            },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::ConfigInvalid { field, reason },
            other => Self::Config(other),
        }
    }
}
