//! Config subcommand handlers.

use std::io::IsTerminal;

use dialoguer::{Confirm, Input, Password};

use surfctl_config::{Config, NetworkSection};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util::{self, prompt_err};

// ── Helpers ─────────────────────────────────────────────────────────

/// Copy of the config with secrets masked.
fn redacted(cfg: &Config) -> Config {
    let mut shown = cfg.clone();
    if shown.sas.token.is_some() {
        shown.sas.token = Some("****".into());
    }
    shown.network.k = "****".into();
    shown.network.opc = "****".into();
    shown
}

fn render_toml(cfg: &Config) -> String {
    toml::to_string_pretty(cfg).unwrap_or_else(|e| format!("# could not render config: {e}"))
}

fn require_terminal(action: &str) -> Result<(), CliError> {
    if std::io::stdin().is_terminal() {
        Ok(())
    } else {
        Err(CliError::Validation {
            field: "interactive".into(),
            reason: format!("{action} needs an interactive terminal"),
        })
    }
}

fn prompt_token() -> Result<String, CliError> {
    let token = Password::new()
        .with_prompt("SAS portal token")
        .interact()
        .map_err(prompt_err)?;
    if token.trim().is_empty() {
        return Err(CliError::Validation {
            field: "token".into(),
            reason: "value cannot be empty".into(),
        });
    }
    Ok(token)
}

/// Guided setup for the fields every deployment has to set.
fn prompt_config(mut cfg: Config) -> Result<Config, CliError> {
    let net = &mut cfg.network;
    net.mcc = Input::new()
        .with_prompt("Mobile country code (MCC)")
        .default(net.mcc.clone())
        .interact_text()
        .map_err(prompt_err)?;
    net.mnc = Input::new()
        .with_prompt("Mobile network code (MNC)")
        .default(net.mnc.clone())
        .interact_text()
        .map_err(prompt_err)?;
    net.imsi_prefix = Input::new()
        .with_prompt("IMSI prefix (11 digits)")
        .default(NetworkSection::prefix_for(&net.mcc, &net.mnc))
        .interact_text()
        .map_err(prompt_err)?;
    net.ue_pool = Input::new()
        .with_prompt("UE address pool (CIDR)")
        .default(net.ue_pool.clone())
        .interact_text()
        .map_err(prompt_err)?;

    let log_path: String = Input::new()
        .with_prompt("MME log path (empty to disable the S1 link feed)")
        .default(
            cfg.mme
                .log_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        )
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;
    cfg.mme.log_path = Some(log_path.trim()).filter(|p| !p.is_empty()).map(Into::into);

    let customer: String = Input::new()
        .with_prompt("SAS portal customer (customers/<id>, empty to disable)")
        .default(cfg.sas.customer_id.clone().unwrap_or_default())
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_err)?;
    cfg.sas.customer_id = Some(customer.trim().to_owned()).filter(|c| !c.is_empty());

    Ok(cfg)
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(args: ConfigArgs, global: &mut GlobalOpts) -> Result<(), CliError> {
    let path = crate::config_file(global);

    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = crate::load_config(global)?;
            crate::apply_defaults(global, &cfg)?;
            let shown = redacted(&cfg);
            let out = output::render_single(global.format(), &shown, render_toml, |_| {
                path.display().to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Init => {
            require_terminal("config init")?;
            if tokio::fs::try_exists(&path).await?
                && !util::confirm(
                    &format!("{} exists. Overwrite?", path.display()),
                    global.yes,
                )?
            {
                return Ok(());
            }

            let cfg = prompt_config(crate::load_config(global)?)?;
            // Reject a bad identity or pool before anything is written.
            cfg.registry_config()?;

            if cfg.sas.customer_id.is_some()
                && Confirm::new()
                    .with_prompt("Store a SAS portal token in the system keyring now?")
                    .default(true)
                    .interact()
                    .map_err(prompt_err)?
            {
                surfctl_config::store_sas_token(&prompt_token()?)?;
                output::notice("   ✓ Token stored in system keyring", global.quiet);
            }

            surfctl_config::save_config_to(&cfg, &path)?;
            output::notice(&format!("✓ Config written to {}", path.display()), global.quiet);
            Ok(())
        }

        ConfigCommand::SetToken => {
            require_terminal("config set-token")?;
            surfctl_config::store_sas_token(&prompt_token()?)?;
            output::notice("✓ SAS token stored in system keyring", global.quiet);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_masks_plaintext_token() {
        let mut cfg = Config::default();
        cfg.sas.token = Some("secret-bearer".into());

        let rendered = render_toml(&redacted(&cfg));
        assert!(rendered.contains("****"));
        assert!(!rendered.contains("secret-bearer"));
        assert!(!rendered.contains(surfctl_core::DEFAULT_K));
    }

    #[test]
    fn absent_token_stays_absent() {
        assert_eq!(redacted(&Config::default()).sas.token, None);
    }
}
