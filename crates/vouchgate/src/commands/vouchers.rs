//! Voucher command handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::Tabled;
use vouchgate_config::Config;
use vouchgate_core::{
    Clock, Issuer, ListFilter, Plan, Price, StatusCounts, SystemClock, Voucher, VoucherState,
    VoucherStore, lifecycle, lookup,
};

use crate::cli::{GlobalOpts, VouchersArgs, VouchersCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct VoucherRow {
    #[tabled(rename = "Code")]
    code: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Plan")]
    plan: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Remaining")]
    remaining: String,
    #[tabled(rename = "Device")]
    mac: String,
}

/// A voucher with its derived state, as shown to operators.
#[derive(Debug, Serialize)]
struct VoucherView {
    #[serde(flatten)]
    voucher: Voucher,
    state: VoucherState,
    remaining_seconds: u64,
}

impl VoucherView {
    fn at(voucher: Voucher, now: DateTime<Utc>) -> Self {
        Self {
            state: lifecycle::state_at(&voucher, now),
            remaining_seconds: lifecycle::remaining_seconds(&voucher, now),
            voucher,
        }
    }

    fn row(&self, color: bool) -> VoucherRow {
        let v = &self.voucher;
        VoucherRow {
            code: v.code.to_string(),
            state: output::paint_state(self.state, color),
            plan: v.plan.clone().unwrap_or_default(),
            price: v.price.to_string(),
            remaining: output::format_remaining(self.remaining_seconds),
            mac: v.bound_mac.as_ref().map(ToString::to_string).unwrap_or_default(),
        }
    }
}

fn opt_time(t: Option<DateTime<Utc>>) -> String {
    t.map_or_else(|| "-".into(), |t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

fn detail(view: &VoucherView) -> String {
    let v = &view.voucher;
    let mut lines = vec![
        format!("Code:       {}", v.code),
        format!("State:      {}", view.state),
        format!("Plan:       {}", v.plan.as_deref().unwrap_or("-")),
        format!("Price:      {}", v.price),
        format!("Remaining:  {}", output::format_remaining(view.remaining_seconds)),
        format!("Created:    {}", opt_time(Some(v.created_at))),
        format!("Activated:  {}", opt_time(v.activated_at)),
        format!("Expires:    {}", opt_time(v.expires_at)),
    ];
    if let Some(mac) = &v.bound_mac {
        lines.push(format!("Device:     {mac}"));
        lines.push(format!("Granted:    {}", opt_time(v.authorized_at)));
    }
    if v.is_developer {
        lines.push("Developer:  yes".into());
    }
    lines.join("\n")
}

fn stats_detail(c: &StatusCounts) -> String {
    [
        format!("Total:      {}", c.total),
        format!("Unused:     {}", c.unused),
        format!("Active:     {}", c.active),
        format!("Expired:    {}", c.expired),
        format!("Reclaimed:  {}", c.reclaimed),
        format!("Revenue:    {}", c.revenue),
    ]
    .join("\n")
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(args: VouchersArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let store = util::open_store(cfg)?;
    let color = output::should_color(global.color);
    let now = SystemClock.now();

    match args.command {
        VouchersCommand::Generate {
            plan,
            duration,
            price,
            count,
            length,
        } => {
            let plan = resolve_plan(cfg, plan, duration, price)?;
            if count == 0 {
                return Err(CliError::Validation {
                    field: "count".into(),
                    reason: "must be at least 1".into(),
                });
            }
            let issued = Issuer::new(Arc::clone(&store))
                .with_code_length(length)?
                .issue_batch(&plan, count)
                .await?;
            print_vouchers(issued, now, global, color)
        }

        VouchersCommand::Developer { code } => {
            let voucher = Issuer::new(store).create_developer(&code).await?;
            print_voucher(voucher, now, global)
        }

        VouchersCommand::List { state, limit } => {
            let filter = ListFilter {
                state: state.map(Into::into),
                limit,
            };
            let vouchers = store.list(filter, now).await?;
            print_vouchers(vouchers, now, global, color)
        }

        VouchersCommand::Show { key } => {
            let voucher = lookup::find_by_code_or_mac(store.as_ref(), &key, now)
                .await?
                .ok_or(CliError::NotFound { identifier: key })?;
            print_voucher(voucher, now, global)
        }

        VouchersCommand::Stats => {
            let counts = store.count_by_status(now).await?;
            let out = output::render_single(global.output, &counts, stats_detail, |c| {
                c.total.to_string()
            })?;
            output::print_output(&out, global.quiet);
            Ok(())
        }

        VouchersCommand::Revoke { code } => {
            let code = util::parse_code(&code)?;
            let reconciler = util::build_reconciler(cfg, store)?;
            let voucher = reconciler.revoke_code(&code).await?;
            if !global.quiet {
                eprintln!("Access for {code} revoked");
            }
            print_voucher(voucher, now, global)
        }

        VouchersCommand::RevokeAll => {
            if !util::confirm(
                "Revoke access for every bound voucher, developer vouchers included?",
                "revoke-all",
                global.yes,
            )? {
                return Ok(());
            }
            let reconciler = util::build_reconciler(cfg, store)?;
            let report = reconciler.revoke_all().await;
            let out = output::render_single(
                global.output,
                &report,
                |r| format!("Revoked {} of {} ({} failed)", r.succeeded, r.examined, r.failed),
                |r| r.succeeded.to_string(),
            )?;
            output::print_output(&out, global.quiet);
            if report.failed > 0 {
                return Err(CliError::GatewayUnavailable {
                    message: format!("{} revocations failed; bindings kept for retry", report.failed),
                });
            }
            Ok(())
        }

        VouchersCommand::EndSession { code } => {
            let code = util::parse_code(&code)?;
            let reconciler = util::build_reconciler(cfg, store)?;
            let voucher = reconciler.end_developer_session(&code).await?;
            if !global.quiet {
                eprintln!("Developer voucher {code} released");
            }
            print_voucher(voucher, now, global)
        }

        VouchersCommand::Purge => {
            if !util::confirm(
                "Delete every voucher? This cannot be undone.",
                "purge",
                global.yes,
            )? {
                return Ok(());
            }
            let removed = store.delete_all().await?;
            if !global.quiet {
                eprintln!("Deleted {removed} vouchers");
            }
            Ok(())
        }

        VouchersCommand::Backup { to } => {
            let target = to.unwrap_or_else(|| default_backup_path(&cfg.database.path, Utc::now()));
            store.backup_to(&target).await?;
            output::print_output(&target.display().to_string(), global.quiet);
            Ok(())
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

/// `<stem>-backup-YYYYMMDD-HHMMSS.db` next to the database file.
fn default_backup_path(db: &Path, at: DateTime<Utc>) -> PathBuf {
    let stem = db
        .file_stem()
        .map_or_else(|| "vouchers".into(), |s| s.to_string_lossy());
    db.with_file_name(format!("{stem}-backup-{}.db", at.format("%Y%m%d-%H%M%S")))
}

fn resolve_plan(
    cfg: &Config,
    plan: Option<String>,
    duration: Option<String>,
    price: Option<String>,
) -> Result<Plan, CliError> {
    match (plan, duration, price) {
        (Some(name), _, _) => Ok(vouchgate_config::find_plan(cfg, &name)?),
        (None, Some(duration), Some(price)) => {
            let price: Price = price.parse().map_err(|e: vouchgate_core::CoreError| {
                CliError::Validation {
                    field: "price".into(),
                    reason: e.to_string(),
                }
            })?;
            Ok(Plan::new("custom", &duration, price)?)
        }
        _ => Err(CliError::Validation {
            field: "plan".into(),
            reason: "pass --plan, or --duration together with --price".into(),
        }),
    }
}

fn print_vouchers(
    vouchers: Vec<Voucher>,
    now: DateTime<Utc>,
    global: &GlobalOpts,
    color: bool,
) -> Result<(), CliError> {
    let views: Vec<VoucherView> = vouchers.into_iter().map(|v| VoucherView::at(v, now)).collect();
    let out = output::render_list(
        global.output,
        &views,
        |v| v.row(color),
        |v| v.voucher.code.to_string(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn print_voucher(voucher: Voucher, now: DateTime<Utc>, global: &GlobalOpts) -> Result<(), CliError> {
    let view = VoucherView::at(voucher, now);
    let out = output::render_single(global.output, &view, detail, |v| v.voucher.code.to_string())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
