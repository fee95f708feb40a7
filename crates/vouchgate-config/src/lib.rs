//! Configuration for vouchgate.
//!
//! TOML file + `VOUCHGATE_*` environment layering (figment), gateway
//! password resolution (env → keyring → plaintext), and translation into
//! the runtime types `vouchgate-core` consumes. Core never sees the TOML
//! structs; it receives a pre-built `GatewayConfig` / `ReconcilerConfig`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use vouchgate_core::{FupPolicy, GatewayConfig, Plan, Price, ReconcilerConfig, TlsVerification};

/// Keyring service name for stored gateway passwords.
pub const KEYRING_SERVICE: &str = "vouchgate";

/// Environment variable consulted for the gateway password.
pub const PASSWORD_ENV: &str = "VOUCHGATE_GATEWAY_PASSWORD";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no password configured for gateway '{host}'")]
    NoCredentials { host: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub database: DatabaseSection,

    #[serde(default)]
    pub reconciler: ReconcilerSection,

    /// Named voucher plans. Empty means the built-in `1H` / `3H` plans.
    #[serde(default)]
    pub plans: BTreeMap<String, PlanSection>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GatewaySection {
    /// Router web root (e.g., "https://192.168.88.1").
    #[serde(default = "default_gateway_url")]
    pub url: String,

    #[serde(default = "default_username")]
    pub username: String,

    /// Password (plaintext -- prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Environment variable name containing the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Accept the router's self-signed certificate.
    #[serde(default)]
    pub insecure: bool,

    /// Path to custom CA certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Hotspot user profile for newly authorized devices.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            username: default_username(),
            password: None,
            password_env: None,
            insecure: false,
            ca_cert: None,
            timeout_secs: default_timeout_secs(),
            default_profile: None,
        }
    }
}

fn default_gateway_url() -> String {
    "https://192.168.88.1".into()
}
fn default_username() -> String {
    "admin".into()
}
fn default_timeout_secs() -> u64 {
    5
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DatabaseSection {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ReconcilerSection {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_usage_interval")]
    pub usage_interval_secs: u64,

    /// Withdraw every gateway grant when `serve` stops.
    #[serde(default)]
    pub revoke_on_shutdown: bool,

    /// Fair-use threshold in megabytes (in + out). Needs `fup_profile`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fup_threshold_mb: Option<u64>,

    /// Hotspot user profile applied past the fair-use threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fup_profile: Option<String>,
}

impl Default for ReconcilerSection {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            usage_interval_secs: default_usage_interval(),
            revoke_on_shutdown: false,
            fup_threshold_mb: None,
            fup_profile: None,
        }
    }
}

fn default_sweep_interval() -> u64 {
    15
}
fn default_usage_interval() -> u64 {
    300
}

/// A voucher plan as written in TOML.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlanSection {
    /// `"1h"`, `"30m"`, `"2d"`, or bare minutes.
    pub validity: Literal,
    pub price: Literal,
}

/// A TOML scalar accepted where users write either `10` or `"10.50"`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// Plans used when the config file defines none.
pub fn default_plans() -> BTreeMap<String, PlanSection> {
    BTreeMap::from([
        (
            "1H".to_owned(),
            PlanSection {
                validity: "1h".into(),
                price: Literal::Int(10),
            },
        ),
        (
            "3H".to_owned(),
            PlanSection {
                validity: "3h".into(),
                price: Literal::Int(25),
            },
        ),
    ])
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "vouchgate")
}

fn dirs_fallback(kind: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(kind);
    p.push("vouchgate");
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn default_database_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback(".local/share").join("vouchgate.db"),
        |dirs| dirs.data_dir().join("vouchgate.db"),
    )
}

// ── Loading & saving ────────────────────────────────────────────────

/// Load the config from defaults, the TOML file, then `VOUCHGATE_*` env.
///
/// Nested keys use a double underscore: `VOUCHGATE_GATEWAY__URL`,
/// `VOUCHGATE_RECONCILER__SWEEP_INTERVAL_SECS`. A missing file is fine.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    debug!(path = %path.display(), "loading config");

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("VOUCHGATE_").split("__"));

    Ok(figment.extract()?)
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Keyring account for a gateway: `<host>/password`.
pub fn keyring_account(gateway: &GatewaySection) -> String {
    format!("{}/password", gateway_host(gateway))
}

fn gateway_host(gateway: &GatewaySection) -> String {
    url::Url::parse(&gateway.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .unwrap_or_else(|| gateway.url.clone())
}

/// Resolve the gateway password.
///
/// Order: the variable named by `password_env`, `VOUCHGATE_GATEWAY_PASSWORD`,
/// the system keyring, then the plaintext `password` field.
pub fn resolve_password(gateway: &GatewaySection) -> Result<SecretString, ConfigError> {
    // 1. Section's password_env → env var lookup
    if let Some(ref env_name) = gateway.password_env {
        if let Ok(val) = std::env::var(env_name) {
            debug!(env = %env_name, "gateway password from environment");
            return Ok(SecretString::from(val));
        }
    }

    // 2. Well-known env var
    if let Ok(val) = std::env::var(PASSWORD_ENV) {
        debug!(env = PASSWORD_ENV, "gateway password from environment");
        return Ok(SecretString::from(val));
    }

    // 3. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &keyring_account(gateway)) {
        if let Ok(secret) = entry.get_password() {
            debug!("gateway password from keyring");
            return Ok(SecretString::from(secret));
        }
    }

    // 4. Plaintext in config
    if let Some(ref pw) = gateway.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        host: gateway_host(gateway),
    })
}

// ── Translation to core types ───────────────────────────────────────

/// Build the core `GatewayConfig`, resolving the password.
pub fn gateway_config(cfg: &Config) -> Result<GatewayConfig, ConfigError> {
    let section = &cfg.gateway;
    let url: url::Url = section
        .url
        .parse()
        .map_err(|_| invalid("gateway.url", format!("invalid URL: {}", section.url)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(
            "gateway.url",
            format!("expected http or https, got '{}'", url.scheme()),
        ));
    }
    if section.timeout_secs == 0 {
        return Err(invalid("gateway.timeout_secs", "must be at least 1"));
    }

    let tls = if section.insecure {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = section.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    Ok(GatewayConfig {
        url,
        username: section.username.clone(),
        password: resolve_password(section)?,
        tls,
        timeout: Duration::from_secs(section.timeout_secs),
        default_profile: section.default_profile.clone(),
    })
}

/// Build the core `ReconcilerConfig`.
pub fn reconciler_config(cfg: &Config) -> Result<ReconcilerConfig, ConfigError> {
    let section = &cfg.reconciler;
    if section.sweep_interval_secs == 0 {
        return Err(invalid("reconciler.sweep_interval_secs", "must be at least 1"));
    }
    if section.usage_interval_secs == 0 {
        return Err(invalid("reconciler.usage_interval_secs", "must be at least 1"));
    }

    let fup = match (section.fup_threshold_mb, section.fup_profile.as_deref()) {
        (None, None) => None,
        (Some(0), _) => {
            return Err(invalid("reconciler.fup_threshold_mb", "must be at least 1"));
        }
        (Some(mb), Some(profile)) if !profile.trim().is_empty() => Some(FupPolicy {
            threshold_bytes: mb.saturating_mul(1024 * 1024),
            throttled_profile: profile.trim().to_owned(),
        }),
        _ => {
            return Err(invalid(
                "reconciler",
                "fup_threshold_mb and fup_profile must be set together",
            ));
        }
    };

    Ok(ReconcilerConfig {
        sweep_interval: Duration::from_secs(section.sweep_interval_secs),
        usage_interval: Duration::from_secs(section.usage_interval_secs),
        fup,
        revoke_on_shutdown: section.revoke_on_shutdown,
    })
}

/// Every configured plan, sorted by name. Falls back to the built-in plans.
pub fn plans(cfg: &Config) -> Result<Vec<Plan>, ConfigError> {
    let defaults;
    let sections = if cfg.plans.is_empty() {
        defaults = default_plans();
        &defaults
    } else {
        &cfg.plans
    };

    sections
        .iter()
        .map(|(name, section)| plan_from_section(name, section))
        .collect()
}

/// Look up one plan by name (case-insensitive).
pub fn find_plan(cfg: &Config, name: &str) -> Result<Plan, ConfigError> {
    let all = plans(cfg)?;
    let available = all.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", ");
    all.iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .cloned()
        .ok_or_else(|| invalid("plan", format!("unknown plan '{name}' (available: {available})")))
}

fn plan_from_section(name: &str, section: &PlanSection) -> Result<Plan, ConfigError> {
    let field = format!("plans.{name}");
    let price: Price = section
        .price
        .to_string()
        .parse()
        .map_err(|e| invalid(&field, format!("price: {e}")))?;
    Plan::new(name, &section.validity.to_string(), price)
        .map_err(|e| invalid(&field, format!("validity: {e}")))
}
