// ── Captive-portal operations ──
//
// What an HTTP front end calls. Every operation commits to the store
// first and only then nudges the reconciler, so a committed activation is
// always eventually authorized and a handler never waits on the router.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::{CoreError, CoreResult};
use crate::gateway::GatewayClient;
use crate::lifecycle::{self, Activation};
use crate::lookup::SessionLookup;
use crate::model::{MacAddress, Voucher, VoucherCode, VoucherState};
use crate::reconciler::ReconcilerHandle;
use crate::store::VoucherStore;

/// Result of a successful activation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReceipt {
    pub code: VoucherCode,
    pub mac: MacAddress,
    pub expires_at: Option<DateTime<Utc>>,
    pub remaining_seconds: u64,
    /// `true` when this call bound the voucher, `false` for a resubmission.
    pub newly_activated: bool,
}

/// What a status page shows for a code or MAC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoucherStatus {
    pub code: VoucherCode,
    pub state: VoucherState,
    pub remaining_seconds: u64,
    pub bound_mac: Option<MacAddress>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_developer: bool,
}

/// Portal facade over the store, lookups and a running reconciler.
pub struct Portal<S, G> {
    store: Arc<S>,
    lookup: SessionLookup<S, G>,
    reconciler: ReconcilerHandle<S, G>,
    clock: Arc<dyn Clock>,
}

impl<S, G> Clone for Portal<S, G> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            lookup: self.lookup.clone(),
            reconciler: self.reconciler.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

/// Portal users see an unknown code and a malformed one the same way.
fn parse_code(raw: &str) -> CoreResult<VoucherCode> {
    VoucherCode::parse(raw).map_err(|_| CoreError::NotFound {
        code: raw.trim().to_ascii_uppercase(),
    })
}

impl<S: VoucherStore, G: GatewayClient> Portal<S, G> {
    pub fn new(
        store: Arc<S>,
        gateway: Arc<G>,
        reconciler: ReconcilerHandle<S, G>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            lookup: SessionLookup::new(Arc::clone(&store), gateway, Arc::clone(&clock)),
            store,
            reconciler,
            clock,
        }
    }

    pub fn lookup(&self) -> &SessionLookup<S, G> {
        &self.lookup
    }

    /// Bind `code` to `mac` and schedule the gateway grant.
    pub async fn activate(&self, code: &str, mac: &MacAddress) -> CoreResult<ActivationReceipt> {
        let code = parse_code(code)?;
        let now = self.clock.now();
        let (activation, voucher) = self.store.activate(&code, mac, now).await?;

        match activation {
            Activation::Activated => {
                info!(%code, %mac, expires_at = ?voucher.expires_at, "voucher activated");
                self.reconciler.request_authorization(voucher.id);
            }
            Activation::AlreadyActiveForMac => {
                debug!(%code, %mac, "voucher resubmitted by its holder");
                if voucher.authorized_at.is_none() {
                    self.reconciler.request_authorization(voucher.id);
                }
            }
        }

        Ok(ActivationReceipt {
            remaining_seconds: lifecycle::remaining_seconds(&voucher, now),
            expires_at: voucher.expires_at,
            newly_activated: activation == Activation::Activated,
            code,
            mac: mac.clone(),
        })
    }

    /// Seconds of access left on `code`.
    pub async fn remaining_seconds(&self, code: &str) -> CoreResult<u64> {
        let code = parse_code(code)?;
        let voucher = self
            .store
            .find_by_code(&code)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                code: code.to_string(),
            })?;
        Ok(lifecycle::remaining_seconds(&voucher, self.clock.now()))
    }

    pub async fn find_active_by_mac(&self, mac: &MacAddress) -> CoreResult<Option<Voucher>> {
        self.lookup.find_active_by_mac(mac).await
    }

    /// Status-page view for a code or MAC.
    pub async fn status(&self, key: &str) -> CoreResult<Option<VoucherStatus>> {
        let now = self.clock.now();
        let voucher = self.lookup.find_active_by_code_or_mac(key).await?;
        Ok(voucher.map(|v| VoucherStatus {
            state: lifecycle::state_at(&v, now),
            remaining_seconds: lifecycle::remaining_seconds(&v, now),
            code: v.code,
            bound_mac: v.bound_mac,
            expires_at: v.expires_at,
            is_developer: v.is_developer,
        }))
    }

    /// Resolve the requesting device's MAC (see [`SessionLookup::resolve_client_mac`]).
    pub async fn resolve_client(&self, mac: Option<&str>, ip: Option<IpAddr>) -> Option<MacAddress> {
        self.lookup.resolve_client_mac(mac, ip).await
    }

    /// Reset a developer voucher so it can be reused from any device.
    ///
    /// The binding is cleared before this returns; withdrawing the old grant
    /// is left to the reconciler, which keeps retrying until it succeeds.
    pub async fn end_session(&self, code: &str) -> CoreResult<Voucher> {
        let code = parse_code(code)?;
        let (previous, voucher) = self
            .store
            .update_atomically(&code, lifecycle::end_session)
            .await?;
        if let Some(mac) = previous {
            info!(%code, %mac, "developer session ended");
            self.reconciler.request_revocation(mac);
        }
        Ok(voucher)
    }
}
