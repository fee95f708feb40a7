//! Gateway command handlers.

use serde::Serialize;
use tabled::Tabled;
use vouchgate_config::Config;
use vouchgate_core::{ActiveSession, GatewayClient, GatewayHealth, SweepReport, UsageReport};

use crate::cli::{GatewayArgs, GatewayCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

use super::util;

#[derive(Tabled)]
struct SessionRow {
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Uptime")]
    uptime: String,
    #[tabled(rename = "Down")]
    bytes_in: String,
    #[tabled(rename = "Up")]
    bytes_out: String,
}

fn session_row(s: &ActiveSession) -> SessionRow {
    SessionRow {
        mac: s.mac.to_string(),
        user: s.user.clone().unwrap_or_default(),
        address: s.address.as_ref().map(ToString::to_string).unwrap_or_default(),
        uptime: s.uptime_secs.map(secs).unwrap_or_default(),
        bytes_in: mebibytes(s.bytes_in),
        bytes_out: mebibytes(s.bytes_out),
    }
}

fn secs(n: u64) -> String {
    humantime::format_duration(std::time::Duration::from_secs(n)).to_string()
}

#[allow(clippy::cast_precision_loss)]
fn mebibytes(bytes: u64) -> String {
    format!("{:.1} MiB", bytes as f64 / 1_048_576.0)
}

fn health_detail(h: &GatewayHealth) -> String {
    let opt = |v: Option<String>| v.unwrap_or_else(|| "-".into());
    [
        format!("Board:    {}", opt(h.board_name.clone())),
        format!("Version:  {}", opt(h.version.clone())),
        format!("Uptime:   {}", opt(h.uptime_secs.map(secs))),
        format!("CPU:      {}", opt(h.cpu_load_percent.map(|p| format!("{p}%")))),
        format!(
            "Memory:   {} free of {}",
            opt(h.free_memory_bytes.map(mebibytes)),
            opt(h.total_memory_bytes.map(mebibytes))
        ),
    ]
    .join("\n")
}

/// Result of `gateway sweep`.
#[derive(Serialize)]
struct SweepSummary {
    sweep: SweepReport,
    usage: UsageReport,
}

pub async fn handle(args: GatewayArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        GatewayCommand::Check => {
            let gateway = util::build_gateway(cfg)?;
            let health = gateway.health().await.map_err(vouchgate_core::CoreError::from)?;
            let out = output::render_single(global.output, &health, health_detail, |h| {
                h.version.clone().unwrap_or_default()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        GatewayCommand::Sessions => {
            let gateway = util::build_gateway(cfg)?;
            let sessions = gateway
                .active_sessions()
                .await
                .map_err(vouchgate_core::CoreError::from)?;
            let out = output::render_list(global.output, &sessions, session_row, |s| {
                s.mac.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        GatewayCommand::Sweep => {
            let store = util::open_store(cfg)?;
            let reconciler = util::build_reconciler(cfg, store)?;
            let summary = SweepSummary {
                sweep: reconciler.run_sweep().await,
                usage: reconciler.usage_sweep().await,
            };
            let out = output::render_single(
                global.output,
                &summary,
                |s| {
                    format!(
                        "Sweep: {} examined, {} succeeded, {} failed\n\
                         Usage: {} sessions, {} throttled, {} failed",
                        s.sweep.examined,
                        s.sweep.succeeded,
                        s.sweep.failed,
                        s.usage.sessions,
                        s.usage.throttled,
                        s.usage.failed
                    )
                },
                |s| s.sweep.failed.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            Ok(())
        }
    }
}
