// ── Runtime configuration ──
//
// These types describe how to reach the gateway and how often the
// reconciler runs. They never touch disk: the binary builds them from
// `vouchgate-config` and hands them in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (RouterOS self-signed `www-ssl` certificate).
    DangerAcceptInvalid,
}

/// Connection settings for a RouterOS gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Router web root, e.g. `https://192.168.88.1`.
    pub url: Url,
    pub username: String,
    pub password: SecretString,
    pub tls: TlsVerification,
    /// Per-request timeout. Kept short so a sweep never stalls on one call.
    pub timeout: Duration,
    /// Hotspot user profile assigned to newly authorized MACs.
    pub default_profile: Option<String>,
}

/// Fair-use policy: sessions past the byte threshold move to a slower profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FupPolicy {
    /// Combined in+out bytes at which a session is throttled.
    pub threshold_bytes: u64,
    /// Hotspot user profile carrying the reduced rate limit.
    pub throttled_profile: String,
}

/// Reconciler timing and policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Expiry and pending-authorization sweep period.
    pub sweep_interval: Duration,
    /// Usage (fair-use) sweep period.
    pub usage_interval: Duration,
    /// Fair-use policy; `None` disables the usage sweep.
    pub fup: Option<FupPolicy>,
    /// Withdraw every gateway grant when the service stops.
    pub revoke_on_shutdown: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(15),
            usage_interval: Duration::from_secs(300),
            fup: None,
            revoke_on_shutdown: false,
        }
    }
}
