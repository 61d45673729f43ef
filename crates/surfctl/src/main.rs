mod cli;
mod commands;
mod error;
mod output;

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use surfctl_config::Config;

use crate::cli::{Cli, ColorMode, Command, GlobalOpts, OutputFormat};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let Cli {
        mut global,
        command,
    } = cli;

    match command {
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "surfctl", &mut std::io::stdout());
            Ok(())
        }

        // Config commands read and write the file themselves.
        Command::Config(args) => commands::config_cmd::handle(args, &mut global).await,

        cmd => {
            let cfg = load_config(&global)?;
            apply_defaults(&mut global, &cfg)?;

            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &cfg, &global).await
        }
    }
}

/// The config file in effect: `--config` / `SURFCTL_CONFIG`, else the
/// platform default.
pub(crate) fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(surfctl_config::config_path)
}

pub(crate) fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(surfctl_config::load_config_from(&config_file(global))?)
}

/// Fill unset output flags from the config file's `[defaults]`.
pub(crate) fn apply_defaults(global: &mut GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    if global.output.is_none() {
        global.output = Some(
            OutputFormat::from_str(&cfg.defaults.output, true).map_err(|reason| {
                CliError::ConfigInvalid {
                    field: "defaults.output".into(),
                    reason,
                }
            })?,
        );
    }
    if global.color.is_none() {
        global.color = Some(ColorMode::from_str(&cfg.defaults.color, true).map_err(|reason| {
            CliError::ConfigInvalid {
                field: "defaults.color".into(),
                reason,
            }
        })?);
    }
    Ok(())
}
