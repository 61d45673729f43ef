//! Command handlers, one module per top-level subcommand.

pub mod config_cmd;
pub mod enodebs;
pub mod network;
pub mod subscribers;
pub mod util;

use surfctl_config::Config;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Route a configured command to its handler.
pub async fn dispatch(cmd: Command, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Subscribers(args) => subscribers::handle(args, cfg, global).await,
        Command::Enodebs(args) => enodebs::handle(args, cfg, global).await,
        Command::Network => network::handle(cfg, global).await,
        // Handled in main before a config is loaded.
        Command::Config(_) | Command::Completions(_) => Ok(()),
    }
}
