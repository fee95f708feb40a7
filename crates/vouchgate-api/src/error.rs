use thiserror::Error;

/// Top-level error type for the `vouchgate-api` crate.
///
/// Covers authentication, transport, RouterOS error envelopes and
/// response decoding. `vouchgate-core` folds these into the gateway
/// error taxonomy (unavailable vs rejected).
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Router refused the configured credentials.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── RouterOS ────────────────────────────────────────────────────
    /// Structured error from the REST API (`{error, message, detail}`).
    #[error("RouterOS error (HTTP {status}): {message}")]
    RouterOs {
        status: u16,
        message: String,
        detail: Option<String>,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this error indicates the credentials were refused.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            Self::RouterOs { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the addressed item does not exist on the router.
    ///
    /// RouterOS answers unknown `.id`s with 404, but some removal commands
    /// report a 400 whose detail reads "no such item".
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::RouterOs { status: 404, .. } => true,
            Self::RouterOs {
                detail: Some(detail),
                ..
            } => detail.to_ascii_lowercase().contains("no such item"),
            _ => false,
        }
    }

    /// Extract the RouterOS `detail` string, if the router sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::RouterOs { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}
