//! Shared helpers for command handlers.

use std::io::IsTerminal;
use std::sync::Arc;

use vouchgate_config::Config;
use vouchgate_core::{
    Reconciler, RouterOsGateway, SqliteVoucherStore, SystemClock, VoucherCode, VoucherStore,
};

use crate::error::CliError;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Without a terminal there is nobody to ask, so the action is refused.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(prompt_err)
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Open the configured database, creating its directory on first use.
pub fn open_store(cfg: &Config) -> Result<Arc<SqliteVoucherStore>, CliError> {
    let path = &cfg.database.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    tracing::debug!(path = %path.display(), "opening voucher database");
    Ok(Arc::new(SqliteVoucherStore::open(path)?))
}

pub fn build_gateway(cfg: &Config) -> Result<Arc<RouterOsGateway>, CliError> {
    let gateway_config = vouchgate_config::gateway_config(cfg)?;
    Ok(Arc::new(RouterOsGateway::new(&gateway_config)?))
}

/// A reconciler for one-shot operator commands (no background task).
pub fn build_reconciler<S: VoucherStore>(
    cfg: &Config,
    store: Arc<S>,
) -> Result<Reconciler<S, RouterOsGateway>, CliError> {
    let reconciler_config = vouchgate_config::reconciler_config(cfg)?;
    Ok(Reconciler::new(
        store,
        build_gateway(cfg)?,
        Arc::new(SystemClock),
        reconciler_config,
    ))
}

pub fn parse_code(raw: &str) -> Result<VoucherCode, CliError> {
    VoucherCode::parse(raw).map_err(|e| CliError::Validation {
        field: "code".into(),
        reason: e.to_string(),
    })
}
