//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod config_cmd;
pub mod gateway;
pub mod serve;
pub mod util;
pub mod vouchers;

use vouchgate_config::Config;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a command that needs the loaded configuration.
pub async fn dispatch(cmd: Command, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Serve(args) => serve::handle(args, cfg).await,
        Command::Vouchers(args) => vouchers::handle(args, cfg, global).await,
        Command::Gateway(args) => gateway::handle(args, cfg, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
            "command dispatched without a handler".into(),
        )),
    }
}
