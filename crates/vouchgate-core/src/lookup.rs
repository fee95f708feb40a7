// ── Session lookup ──
//
// Read-only queries a portal uses to recognise a returning device. Nothing
// here mutates vouchers or the gateway.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::error::CoreResult;
use crate::gateway::GatewayClient;
use crate::lifecycle;
use crate::model::{MacAddress, Voucher, VoucherCode};
use crate::store::VoucherStore;

/// The voucher giving `mac` access at `now`: the one expiring last among
/// those with time left.
pub async fn active_for_mac<S: VoucherStore>(
    store: &S,
    mac: &MacAddress,
    now: DateTime<Utc>,
) -> CoreResult<Option<Voucher>> {
    let bound = store.find_bound_to_mac(mac).await?;
    Ok(bound
        .into_iter()
        .filter(|v| lifecycle::remaining_seconds(v, now) > 0)
        .max_by_key(|v| lifecycle::remaining_seconds(v, now)))
}

/// A code in any state, else the voucher giving a MAC access at `now`.
///
/// Shared by the portal status page and the operator `show` command.
pub async fn find_by_code_or_mac<S: VoucherStore>(
    store: &S,
    key: &str,
    now: DateTime<Utc>,
) -> CoreResult<Option<Voucher>> {
    if let Ok(code) = VoucherCode::parse(key) {
        if let Some(voucher) = store.find_by_code(&code).await? {
            return Ok(Some(voucher));
        }
    }
    match MacAddress::parse(key) {
        Ok(mac) => active_for_mac(store, &mac, now).await,
        Err(_) => Ok(None),
    }
}

/// Lookups over the store, with the gateway as a fallback for IP resolution.
pub struct SessionLookup<S, G> {
    store: Arc<S>,
    gateway: Arc<G>,
    clock: Arc<dyn Clock>,
}

impl<S, G> Clone for SessionLookup<S, G> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            gateway: Arc::clone(&self.gateway),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S: VoucherStore, G: GatewayClient> SessionLookup<S, G> {
    pub fn new(store: Arc<S>, gateway: Arc<G>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            gateway,
            clock,
        }
    }

    /// The voucher giving `mac` access right now, if any.
    ///
    /// When several are bound (a developer voucher alongside a paid one),
    /// the one expiring last wins.
    pub async fn find_active_by_mac(&self, mac: &MacAddress) -> CoreResult<Option<Voucher>> {
        active_for_mac(self.store.as_ref(), mac, self.clock.now()).await
    }

    /// Resolve a status-page key: an exact code first, then a MAC.
    ///
    /// A code match is returned whatever its state so the page can say
    /// "expired"; a MAC match only finds active vouchers. Display only:
    /// never use the result to decide access.
    pub async fn find_active_by_code_or_mac(&self, key: &str) -> CoreResult<Option<Voucher>> {
        find_by_code_or_mac(self.store.as_ref(), key, self.clock.now()).await
    }

    /// Work out the client's MAC from what the portal request carried.
    ///
    /// A valid MAC wins; otherwise the IP is resolved through the gateway.
    /// Gateway trouble yields `None` so the caller can ask the user to
    /// reconnect instead of failing the page.
    pub async fn resolve_client_mac(
        &self,
        mac: Option<&str>,
        ip: Option<IpAddr>,
    ) -> Option<MacAddress> {
        if let Some(raw) = mac.filter(|m| !m.trim().is_empty()) {
            match MacAddress::parse(raw) {
                Ok(mac) => return Some(mac),
                Err(e) => debug!(raw, error = %e, "ignoring malformed client MAC"),
            }
        }
        let ip = ip?;
        match self.gateway.lookup_mac_by_ip(ip).await {
            Ok(found) => found,
            Err(e) => {
                warn!(%ip, error = %e, "MAC lookup by IP failed");
                None
            }
        }
    }
}
