//! Config subcommand handlers.

use dialoguer::{Confirm, Input, Password, Select};
use vouchgate_config::{self as config, Config, GatewaySection};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util::prompt_err;

const REDACTED: &str = "********";

fn keyring_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "keyring".into(),
        reason: format!("failed to access keyring: {e}"),
    }
}

/// Store the gateway password in the keyring under `<host>/password`.
fn store_in_keyring(gateway: &GatewaySection, password: &str) -> Result<(), CliError> {
    let entry = keyring::Entry::new(config::KEYRING_SERVICE, &config::keyring_account(gateway))
        .map_err(keyring_err)?;
    entry.set_password(password).map_err(keyring_err)
}

fn prompt_password() -> Result<String, CliError> {
    Password::new()
        .with_prompt("Gateway password")
        .allow_empty_password(true)
        .interact()
        .map_err(prompt_err)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = global.config.clone().unwrap_or_else(config::config_path);

    match args.command {
        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = config::load_config(Some(path.as_path()))?;
            if cfg.gateway.password.is_some() {
                cfg.gateway.password = Some(REDACTED.into());
            }
            let out = output::render_single(
                global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_else(|e| format!("{c:#?}\n({e})")),
                |_| path.display().to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        // ── Init: interactive wizard ────────────────────────────────
        ConfigCommand::Init => {
            if path.exists()
                && !Confirm::new()
                    .with_prompt(format!("{} exists. Overwrite?", path.display()))
                    .default(false)
                    .interact()
                    .map_err(prompt_err)?
            {
                return Ok(());
            }
            eprintln!("vouchgate configuration wizard");
            eprintln!("   Config path: {}\n", path.display());

            let mut cfg = Config::default();

            cfg.gateway.url = Input::new()
                .with_prompt("Router URL")
                .default(cfg.gateway.url.clone())
                .interact_text()
                .map_err(prompt_err)?;
            cfg.gateway.username = Input::new()
                .with_prompt("Router username")
                .default(cfg.gateway.username.clone())
                .interact_text()
                .map_err(prompt_err)?;

            let password = prompt_password()?;
            let choices = &[
                "Store in system keyring (recommended)",
                "Save to config file (plaintext)",
            ];
            let selection = Select::new()
                .with_prompt("Where to store the password?")
                .items(choices)
                .default(0)
                .interact()
                .map_err(prompt_err)?;
            if selection == 0 {
                store_in_keyring(&cfg.gateway, &password)?;
                eprintln!("   Password stored in system keyring");
            } else {
                cfg.gateway.password = Some(password);
            }

            cfg.gateway.insecure = Confirm::new()
                .with_prompt("Accept the router's self-signed certificate?")
                .default(true)
                .interact()
                .map_err(prompt_err)?;

            cfg.plans = config::default_plans();
            config::save_config(&cfg, &path)?;

            eprintln!("\nConfiguration written to {}", path.display());
            eprintln!("  Test it: vouchgate gateway check");
            Ok(())
        }

        ConfigCommand::SetPassword => {
            let cfg = config::load_config(Some(path.as_path()))?;
            let password = prompt_password()?;
            store_in_keyring(&cfg.gateway, &password)?;
            if !global.quiet {
                eprintln!(
                    "Password for {} stored in system keyring",
                    config::keyring_account(&cfg.gateway)
                );
            }
            Ok(())
        }
    }
}
