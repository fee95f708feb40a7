//! Clap derive structures for the `vouchgate` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use vouchgate_core::VoucherState;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// vouchgate -- voucher lifecycle and access reconciler for MikroTik hotspots
#[derive(Debug, Parser)]
#[command(
    name = "vouchgate",
    version,
    about = "Sell hotspot access by voucher on a MikroTik router",
    long_about = "Issues time-limited voucher codes, binds each to the device that\n\
        redeems it, and keeps the router's hotspot in step: devices are let in\n\
        when a voucher is activated and cut off when its time runs out.",
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
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "VOUCHGATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "VOUCHGATE_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
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
    /// Run the access reconciler until interrupted
    Serve(ServeArgs),

    /// Issue, inspect and revoke vouchers
    #[command(alias = "v")]
    Vouchers(VouchersArgs),

    /// Inspect the RouterOS gateway
    #[command(alias = "gw")]
    Gateway(GatewayArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  SERVE
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Withdraw every gateway grant on shutdown (overrides config)
    #[arg(long)]
    pub revoke_on_shutdown: bool,

    /// Keep vouchers in memory only (nothing is written to disk)
    #[arg(long)]
    pub ephemeral: bool,

    /// Also write logs to a daily-rotated file in this directory
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  VOUCHERS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct VouchersArgs {
    #[command(subcommand)]
    pub command: VouchersCommand,
}

#[derive(Debug, Subcommand)]
pub enum VouchersCommand {
    /// Issue new vouchers from a plan or an ad-hoc validity and price
    #[command(alias = "gen")]
    Generate {
        /// Plan name from the config file (e.g. 1H)
        #[arg(long, short = 'p', conflicts_with_all = ["duration", "price"])]
        plan: Option<String>,

        /// Validity such as 1h, 30m, 2d (bare number = minutes)
        #[arg(long, short = 'd', requires = "price")]
        duration: Option<String>,

        /// Price, e.g. 10 or 12.50
        #[arg(long, requires = "duration")]
        price: Option<String>,

        /// Number of vouchers to issue
        #[arg(long, short = 'n', default_value = "1")]
        count: usize,

        /// Code length
        #[arg(long, default_value = "6")]
        length: usize,
    },

    /// Create a reusable developer voucher with a chosen code
    #[command(alias = "dev")]
    Developer {
        /// Code (4-16 letters and digits)
        code: String,
    },

    /// List vouchers, newest first
    #[command(alias = "ls")]
    List {
        /// Only vouchers in this state
        #[arg(long, short = 's')]
        state: Option<StateFilter>,

        /// Max results
        #[arg(long, short = 'l')]
        limit: Option<usize>,
    },

    /// Show one voucher by code, or the active voucher of a MAC
    Show {
        /// Voucher code or MAC address
        key: String,
    },

    /// Counts per state and revenue
    Stats,

    /// Revoke a voucher's access now
    Revoke {
        /// Voucher code
        code: String,
    },

    /// Revoke every bound voucher, developer vouchers included
    RevokeAll,

    /// Release a developer voucher so another device can use it
    EndSession {
        /// Developer voucher code
        code: String,
    },

    /// Delete every voucher from the database
    Purge,

    /// Copy the voucher database to a backup file
    Backup {
        /// Target file [default: timestamped copy next to the database]
        #[arg(long)]
        to: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StateFilter {
    Unused,
    Active,
    Expired,
    Reclaimed,
}

impl From<StateFilter> for VoucherState {
    fn from(s: StateFilter) -> Self {
        match s {
            StateFilter::Unused => Self::Unused,
            StateFilter::Active => Self::Active,
            StateFilter::Expired => Self::Expired,
            StateFilter::Reclaimed => Self::Reclaimed,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  GATEWAY
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct GatewayArgs {
    #[command(subcommand)]
    pub command: GatewayCommand,
}

#[derive(Debug, Subcommand)]
pub enum GatewayCommand {
    /// Check connectivity and report router health
    Check,

    /// List logged-in hotspot sessions
    Sessions,

    /// Run one reconciliation sweep now and exit
    Sweep,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Show the effective configuration (file + environment)
    Show,

    /// Interactive setup wizard
    Init,

    /// Store the gateway password in the system keyring
    SetPassword,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
