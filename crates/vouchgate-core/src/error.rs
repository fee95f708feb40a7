// ── Core error types ──
//
// User-facing errors from vouchgate-core. Portal callers see one of a
// handful of outcomes (not found, already used, not permitted, gateway
// trouble, validation); storage and internal failures carry a message
// for the operator log.

use thiserror::Error;

use crate::gateway::GatewayError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Voucher errors ───────────────────────────────────────────────
    #[error("Voucher not found: {code}")]
    NotFound { code: String },

    #[error("Voucher {code} has already been used")]
    AlreadyActivated { code: String },

    #[error("Operation not permitted: {reason}")]
    NotPermitted { reason: String },

    #[error("Voucher code already exists: {code}")]
    DuplicateCode { code: String },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Gateway errors ───────────────────────────────────────────────
    #[error("Gateway unavailable: {message}")]
    GatewayUnavailable { message: String },

    #[error("Gateway rejected the request: {message}")]
    GatewayRejected { message: String },

    // ── Storage errors ───────────────────────────────────────────────
    #[error("Storage error: {message}")]
    Storage { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Returns `true` if retrying the same operation later may succeed
    /// without operator intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable { .. } | Self::Storage { .. })
    }

    /// Returns `true` if the voucher or MAC was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ── Conversion from lower layers ─────────────────────────────────────

impl From<GatewayError> for CoreError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(message) => Self::GatewayUnavailable { message },
            GatewayError::Rejected(message) => Self::GatewayRejected { message },
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage {
            message: err.to_string(),
        }
    }
}

impl From<vouchgate_api::Error> for CoreError {
    fn from(err: vouchgate_api::Error) -> Self {
        GatewayError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gateway_errors_keep_their_category() {
        let unavailable: CoreError = GatewayError::Unavailable("timeout".into()).into();
        let rejected: CoreError = GatewayError::Rejected("bad profile".into()).into();
        assert!(unavailable.is_retryable());
        assert!(!rejected.is_retryable());
    }

    #[test]
    fn already_activated_message_is_user_facing() {
        let err = CoreError::AlreadyActivated {
            code: "AB12CD".into(),
        };
        assert_eq!(err.to_string(), "Voucher AB12CD has already been used");
    }
}
