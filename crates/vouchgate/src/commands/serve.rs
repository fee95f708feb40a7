//! `vouchgate serve`: run the reconciler until interrupted.

use std::sync::Arc;

use tracing::{info, warn};
use vouchgate_config::Config;
use vouchgate_core::{
    GatewayClient, MemoryVoucherStore, Reconciler, RouterOsGateway, SystemClock, VoucherStore,
};

use crate::cli::ServeArgs;
use crate::error::CliError;

use super::util;

pub async fn handle(args: ServeArgs, cfg: &Config) -> Result<(), CliError> {
    let mut reconciler_config = vouchgate_config::reconciler_config(cfg)?;
    if args.revoke_on_shutdown {
        reconciler_config.revoke_on_shutdown = true;
    }
    let gateway = util::build_gateway(cfg)?;

    // A router that is down at startup is not fatal: the sweeps retry.
    match gateway.health().await {
        Ok(health) => info!(
            board = health.board_name.as_deref().unwrap_or("unknown"),
            version = health.version.as_deref().unwrap_or("unknown"),
            "gateway reachable"
        ),
        Err(e) => warn!(error = %e, "gateway health check failed; continuing"),
    }

    if args.ephemeral {
        warn!("ephemeral mode: vouchers are kept in memory and lost on exit");
        run(Arc::new(MemoryVoucherStore::new()), gateway, reconciler_config).await
    } else {
        let store = util::open_store(cfg)?;
        info!(path = %cfg.database.path.display(), "voucher database opened");
        run(store, gateway, reconciler_config).await
    }
}

async fn run<S: VoucherStore>(
    store: Arc<S>,
    gateway: Arc<RouterOsGateway>,
    config: vouchgate_core::ReconcilerConfig,
) -> Result<(), CliError> {
    let reconciler = Reconciler::new(store, gateway, Arc::new(SystemClock), config);
    let running = reconciler.start();

    wait_for_shutdown().await?;
    info!("shutdown requested");

    if let Some(report) = running.shutdown().await {
        if report.failed > 0 {
            warn!(
                failed = report.failed,
                "some grants could not be withdrawn; check the router"
            );
        }
    }
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> Result<(), CliError> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<(), CliError> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
