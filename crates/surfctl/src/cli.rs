//! Clap derive structures for the `surfctl` CLI.
//!
//! Defines the complete command tree, global flags, and shared types.

use std::net::Ipv4Addr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// surfctl -- operate a private LTE core from the command line
#[derive(Debug, Parser)]
#[command(
    name = "surfctl",
    version,
    about = "Provision LTE subscribers and inspect radio-node state",
    long_about = "Manages the subscriber registry of a private LTE core and reports\n\
        the merged state of its radio nodes: S1 signaling links from the MME\n\
        log combined with CBRS spectrum grants from the SAS portal.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, env = "SURFCTL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format [default: from config, else table]
    #[arg(long, short = 'o', env = "SURFCTL_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output [default: from config, else auto]
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

impl GlobalOpts {
    pub fn format(&self) -> OutputFormat {
        self.output.unwrap_or(OutputFormat::Table)
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color.unwrap_or(ColorMode::Auto)
    }
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Provision and manage subscribers
    #[command(alias = "subs", alias = "s")]
    Subscribers(SubscribersArgs),

    /// Merged radio-node state (S1 link + SAS grants)
    #[command(alias = "enb", alias = "e")]
    Enodebs(EnodebsArgs),

    /// Show network identity, APN profile and pool usage
    #[command(alias = "net")]
    Network,

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Subscribers ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SubscribersArgs {
    #[command(subcommand)]
    pub command: SubscribersCommand,
}

#[derive(Debug, Subcommand)]
pub enum SubscribersCommand {
    /// List all subscribers
    #[command(alias = "ls")]
    List,

    /// Show one subscriber
    Get {
        /// Full 15-digit IMSI
        imsi: String,
    },

    /// Provision a new subscriber
    #[command(alias = "create")]
    Add {
        /// `next`, a 1-4 digit suffix, or a full 15-digit IMSI
        #[arg(default_value = "next")]
        identity: String,

        /// Display name [default: Device-NNNN]
        #[arg(long, short = 'n')]
        name: Option<String>,

        /// Static UE address (defaults to the next free pool address)
        #[arg(long)]
        ip: Option<Ipv4Addr>,
    },

    /// Rename a subscriber or move it to another address
    Update {
        /// Full 15-digit IMSI
        imsi: String,

        /// New display name
        #[arg(long, short = 'n')]
        name: Option<String>,

        /// New UE address
        #[arg(long)]
        ip: Option<Ipv4Addr>,
    },

    /// Delete a subscriber and free its identity and address
    #[command(alias = "rm")]
    Delete {
        /// Full 15-digit IMSI
        imsi: String,
    },

    /// Show UEs currently attached, per the MME log
    #[command(alias = "connections")]
    Sessions,
}

// ── Radio nodes ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct EnodebsArgs {
    #[command(subcommand)]
    pub command: EnodebsCommand,
}

#[derive(Debug, Subcommand)]
pub enum EnodebsCommand {
    /// Show the merged node view
    #[command(alias = "ls")]
    Status {
        /// Only this serial number
        serial: Option<String>,

        /// Poll both feeds now instead of showing the last saved view
        #[arg(long, short = 'r')]
        refresh: bool,
    },

    /// Grant history and derived state transitions for one node
    History {
        /// Serial number
        serial: String,

        /// Poll both feeds before reading the history
        #[arg(long, short = 'r')]
        refresh: bool,
    },

    /// Refresh periodically and print a summary line per cycle
    Watch {
        /// Seconds between cycles [default: reconcile.interval_secs]
        #[arg(long, short = 'i')]
        interval: Option<u64>,
    },

    /// Drop a node from the saved view
    #[command(alias = "rm")]
    Remove {
        /// Serial number
        serial: String,
    },
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create initial config file with guided setup
    Init,

    /// Display current resolved configuration
    Show,

    /// Print the config file path
    Path,

    /// Store the SAS portal token in the system keyring
    SetToken,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
