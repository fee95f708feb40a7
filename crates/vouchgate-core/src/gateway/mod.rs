// ── Gateway boundary ──
//
// Everything vouchgate asks of the network device. Implementations must be
// idempotent: authorizing an authorized MAC or revoking an unknown one
// succeeds. The reconciler depends on that to retry blindly.

mod routeros;

use std::net::IpAddr;

use serde::Serialize;
use thiserror::Error;

use crate::model::MacAddress;

pub use routeros::RouterOsGateway;

/// Why a gateway call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// Unreachable, timed out, or answered with a server error. Retry later.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    /// The gateway refused the request. Retrying will not help until an
    /// operator fixes credentials, profiles or the like.
    #[error("gateway rejected request: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<vouchgate_api::Error> for GatewayError {
    fn from(err: vouchgate_api::Error) -> Self {
        use vouchgate_api::Error as Api;
        match &err {
            Api::Transport(_) | Api::Timeout { .. } => Self::Unavailable(err.to_string()),
            Api::RouterOs { status, .. } if *status >= 500 => Self::Unavailable(err.to_string()),
            Api::RouterOs { .. }
            | Api::Authentication { .. }
            | Api::InvalidUrl(_)
            | Api::Tls(_)
            | Api::Deserialization { .. } => Self::Rejected(err.to_string()),
        }
    }
}

/// A logged-in hotspot session as the gateway reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSession {
    pub mac: MacAddress,
    pub user: Option<String>,
    pub address: Option<IpAddr>,
    pub uptime_secs: Option<u64>,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub time_left_secs: Option<u64>,
}

impl ActiveSession {
    pub fn total_bytes(&self) -> u64 {
        self.bytes_in.saturating_add(self.bytes_out)
    }
}

/// Router identity and load, for `gateway check`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GatewayHealth {
    pub board_name: Option<String>,
    pub version: Option<String>,
    pub uptime_secs: Option<u64>,
    pub cpu_load_percent: Option<u8>,
    pub free_memory_bytes: Option<u64>,
    pub total_memory_bytes: Option<u64>,
}

/// Network-access control on the gateway.
pub trait GatewayClient: Send + Sync + 'static {
    /// Grant `mac` access for at most `duration_secs`. Upserts.
    fn authorize(
        &self,
        mac: &MacAddress,
        duration_secs: u64,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Withdraw any grant for `mac` and end its sessions. Succeeds if none exists.
    fn revoke(&self, mac: &MacAddress) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Current sessions with byte counters. Entries the gateway reports
    /// without a usable MAC are skipped.
    fn active_sessions(&self)
    -> impl Future<Output = Result<Vec<ActiveSession>, GatewayError>> + Send;

    /// Resolve a client IP to its MAC, if the gateway has seen it.
    fn lookup_mac_by_ip(
        &self,
        ip: IpAddr,
    ) -> impl Future<Output = Result<Option<MacAddress>, GatewayError>> + Send;

    /// Move an authorized MAC onto a different service profile.
    fn set_service_profile(
        &self,
        mac: &MacAddress,
        profile: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn health(&self) -> impl Future<Output = Result<GatewayHealth, GatewayError>> + Send;
}
