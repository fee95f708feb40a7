//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use vouchgate_config::ConfigError;
use vouchgate_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Gateway ──────────────────────────────────────────────────────
    #[error("Gateway unavailable: {message}")]
    #[diagnostic(
        code(vouchgate::gateway_unavailable),
        help(
            "Check that the router is reachable and its REST API (www-ssl) is enabled.\n\
             Try: vouchgate gateway check"
        )
    )]
    GatewayUnavailable { message: String },

    #[error("Gateway rejected the request: {message}")]
    #[diagnostic(
        code(vouchgate::gateway_rejected),
        help(
            "Verify the gateway username, password and hotspot profiles.\n\
             Store the password with: vouchgate config set-password"
        )
    )]
    GatewayRejected { message: String },

    #[error("No password configured for gateway '{host}'")]
    #[diagnostic(
        code(vouchgate::no_credentials),
        help(
            "Run: vouchgate config set-password\n\
             Or set VOUCHGATE_GATEWAY_PASSWORD in the environment."
        )
    )]
    NoCredentials { host: String },

    // ── Vouchers ─────────────────────────────────────────────────────
    #[error("Voucher '{identifier}' not found")]
    #[diagnostic(
        code(vouchgate::not_found),
        help("Run: vouchgate vouchers list to see issued vouchers")
    )]
    NotFound { identifier: String },

    #[error("{message}")]
    #[diagnostic(code(vouchgate::conflict))]
    Conflict { message: String },

    #[error("{reason}")]
    #[diagnostic(code(vouchgate::not_permitted))]
    NotPermitted { reason: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(vouchgate::validation))]
    Validation { field: String, reason: String },

    // ── Configuration / storage ──────────────────────────────────────
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(vouchgate::config),
        help("Inspect the effective settings with: vouchgate config show")
    )]
    Config { message: String },

    #[error("Storage error: {message}")]
    #[diagnostic(
        code(vouchgate::storage),
        help("Check the database path in the config (database.path) and its permissions.")
    )]
    Storage { message: String },

    #[error("Internal error: {0}")]
    #[diagnostic(code(vouchgate::internal))]
    Internal(String),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(vouchgate::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to render YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::GatewayUnavailable { .. } => exit_code::CONNECTION,
            Self::GatewayRejected { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::NotPermitted { .. } => exit_code::PERMISSION,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::NotFound { code } => Self::NotFound { identifier: code },
            err @ (CoreError::AlreadyActivated { .. } | CoreError::DuplicateCode { .. }) => {
                Self::Conflict {
                    message: err.to_string(),
                }
            }
            CoreError::NotPermitted { reason } => Self::NotPermitted { reason },
            CoreError::ValidationFailed { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::GatewayUnavailable { message } => Self::GatewayUnavailable { message },
            CoreError::GatewayRejected { message } => Self::GatewayRejected { message },
            CoreError::Storage { message } => Self::Storage { message },
            CoreError::Config { message } => Self::Config { message },
            CoreError::Internal(message) => Self::Internal(message),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { host } => Self::NoCredentials { host },
            ConfigError::Io(e) => Self::Io(e),
            other @ (ConfigError::Serialization(_) | ConfigError::Figment(_)) => Self::Config {
                message: other.to_string(),
            },
        }
    }
}
