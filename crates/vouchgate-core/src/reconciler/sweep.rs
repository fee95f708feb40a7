// Sweep passes
//
// Each pass reads its work list from the store (or the gateway), acts on
// every item independently, and reports counts. One failing MAC never
// stops the rest of the pass; it is simply picked up again next time.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::{Reconciler, SweepReport, UsageReport, locked};
use crate::error::{CoreError, CoreResult};
use crate::gateway::GatewayClient;
use crate::lifecycle::{self, DEVELOPER_REMAINING_SECONDS};
use crate::model::{MacAddress, Voucher, VoucherCode, VoucherState};
use crate::store::VoucherStore;

impl<S: VoucherStore, G: GatewayClient> Reconciler<S, G> {
    // ── Expiry ───────────────────────────────────────────────────────

    /// Withdraw the grant of every expired voucher and clear its binding.
    ///
    /// The binding is only cleared after the gateway confirms, so a failed
    /// revoke is retried on the next pass.
    pub async fn expiry_sweep(&self) -> SweepReport {
        let now = self.inner.clock.now();
        let due = match self.inner.store.find_expired_still_bound(now).await {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "expiry sweep: cannot read vouchers");
                return SweepReport::default();
            }
        };

        let mut report = SweepReport {
            examined: due.len(),
            ..SweepReport::default()
        };
        for voucher in due {
            if self.revoke_and_clear(&voucher, "expired").await {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    /// Revoke `voucher`'s MAC and clear the binding. `true` on success.
    ///
    /// When the MAC also holds another active voucher only the binding is
    /// cleared; the gateway grant now belongs to the other voucher.
    async fn revoke_and_clear(&self, voucher: &Voucher, reason: &'static str) -> bool {
        let Some(mac) = voucher.bound_mac.as_ref() else {
            return true;
        };
        match self.held_by_other_active(voucher, mac).await {
            Ok(true) => {
                debug!(code = %voucher.code, %mac, "MAC holds another active voucher; grant kept");
            }
            Ok(false) => {
                if let Err(e) = self.inner.gateway.revoke(mac).await {
                    warn!(
                        code = %voucher.code,
                        %mac,
                        error = %e,
                        retryable = e.is_retryable(),
                        "revoke failed; binding kept for retry"
                    );
                    return false;
                }
            }
            Err(e) => {
                warn!(code = %voucher.code, %mac, error = %e, "cannot check MAC bindings; binding kept");
                return false;
            }
        }
        match self.inner.store.clear_binding(voucher.id, mac).await {
            Ok(true) => {
                info!(code = %voucher.code, %mac, reason, "access revoked");
                true
            }
            Ok(false) => {
                debug!(code = %voucher.code, %mac, "binding changed during revoke");
                true
            }
            Err(e) => {
                warn!(code = %voucher.code, %mac, error = %e, "revoked but binding not cleared");
                false
            }
        }
    }

    /// Whether a voucher other than `voucher` is active on `mac` right now.
    async fn held_by_other_active(&self, voucher: &Voucher, mac: &MacAddress) -> CoreResult<bool> {
        let now = self.inner.clock.now();
        let bound = self.inner.store.find_bound_to_mac(mac).await?;
        Ok(bound
            .iter()
            .any(|v| v.id != voucher.id && lifecycle::state_at(v, now) == VoucherState::Active))
    }

    // ── Orphaned revocations ─────────────────────────────────────────

    /// Retry revokes for MACs whose binding was cleared by a developer
    /// session reset but whose gateway grant may still be live.
    pub async fn orphan_sweep(&self) -> SweepReport {
        let orphans = self.pending_orphans();
        let mut report = SweepReport {
            examined: orphans.len(),
            ..SweepReport::default()
        };
        for mac in orphans {
            locked(&self.inner.orphans).remove(&mac);
            if self.revoke_orphan(mac).await {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    /// Revoke a MAC with no binding. Re-queued as an orphan on failure.
    pub(crate) async fn revoke_orphan(&self, mac: MacAddress) -> bool {
        // The MAC may have claimed a voucher again since its binding was
        // cleared; its new grant must survive.
        let now = self.inner.clock.now();
        match self.inner.store.find_bound_to_mac(&mac).await {
            Ok(bound) if bound.iter().any(|v| lifecycle::state_at(v, now) == VoucherState::Active) => {
                debug!(%mac, "orphan re-bound to an active voucher; skipping revoke");
                return true;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%mac, error = %e, "cannot check orphan binding");
                self.remember_orphan(mac);
                return false;
            }
        }

        match self.inner.gateway.revoke(&mac).await {
            Ok(()) => {
                info!(%mac, "released session access revoked");
                true
            }
            Err(e) => {
                warn!(%mac, error = %e, retryable = e.is_retryable(), "revoke failed; will retry");
                self.remember_orphan(mac);
                false
            }
        }
    }

    // ── Authorization ────────────────────────────────────────────────

    /// Grant access to every active binding without a confirmed grant.
    ///
    /// Covers handler nudges that were dropped and activations committed
    /// while the gateway was down.
    pub async fn authorization_sweep(&self) -> SweepReport {
        let now = self.inner.clock.now();
        let pending = match self.inner.store.find_pending_authorization(now).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "authorization sweep: cannot read vouchers");
                return SweepReport::default();
            }
        };

        let mut report = SweepReport {
            examined: pending.len(),
            ..SweepReport::default()
        };
        for voucher in pending {
            if self.authorize_one(&voucher).await {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    /// Grant access for one voucher now, if it still needs it.
    ///
    /// Returns `Ok(false)` when there was nothing to do or the gateway call
    /// failed (the authorization sweep retries).
    pub async fn authorize_voucher(&self, voucher_id: i64) -> CoreResult<bool> {
        let Some(voucher) = self.inner.store.get(voucher_id).await? else {
            return Err(CoreError::NotFound {
                code: format!("#{voucher_id}"),
            });
        };
        if !lifecycle::needs_authorization(&voucher, self.inner.clock.now()) {
            return Ok(false);
        }
        Ok(self.authorize_one(&voucher).await)
    }

    async fn authorize_one(&self, voucher: &Voucher) -> bool {
        let Some(mac) = voucher.bound_mac.as_ref() else {
            return false;
        };
        let now = self.inner.clock.now();
        let remaining = lifecycle::remaining_seconds(voucher, now);
        if remaining == 0 {
            return false;
        }

        if let Err(e) = self.inner.gateway.authorize(mac, remaining).await {
            warn!(
                code = %voucher.code,
                %mac,
                error = %e,
                retryable = e.is_retryable(),
                "authorization failed; will retry"
            );
            return false;
        }

        match self.inner.store.mark_authorized(voucher.id, mac, now).await {
            Ok(true) => {
                if remaining == DEVELOPER_REMAINING_SECONDS {
                    info!(code = %voucher.code, %mac, "developer access granted");
                } else {
                    info!(code = %voucher.code, %mac, remaining_secs = remaining, "access granted");
                }
                true
            }
            Ok(false) => {
                debug!(code = %voucher.code, %mac, "binding changed before grant was recorded");
                false
            }
            Err(e) => {
                warn!(code = %voucher.code, error = %e, "granted but not recorded; will re-grant");
                false
            }
        }
    }

    // ── Fair use ─────────────────────────────────────────────────────

    /// Move sessions past the byte threshold onto the throttled profile.
    ///
    /// Each MAC is downgraded once and remembered until it drops off the
    /// active list. Does nothing without a fair-use policy.
    pub async fn usage_sweep(&self) -> UsageReport {
        let Some(policy) = self.inner.config.fup.clone() else {
            return UsageReport::default();
        };
        let sessions = match self.inner.gateway.active_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "usage sweep: cannot list sessions");
                return UsageReport {
                    failed: 1,
                    ..UsageReport::default()
                };
            }
        };

        let present: HashSet<&MacAddress> = sessions.iter().map(|s| &s.mac).collect();
        locked(&self.inner.throttled).retain(|mac| present.contains(mac));

        let mut report = UsageReport {
            sessions: sessions.len(),
            ..UsageReport::default()
        };
        for session in sessions
            .iter()
            .filter(|s| s.total_bytes() >= policy.threshold_bytes)
        {
            if locked(&self.inner.throttled).contains(&session.mac) {
                continue;
            }
            match self
                .inner
                .gateway
                .set_service_profile(&session.mac, &policy.throttled_profile)
                .await
            {
                Ok(()) => {
                    locked(&self.inner.throttled).insert(session.mac.clone());
                    report.throttled += 1;
                    info!(
                        mac = %session.mac,
                        bytes = session.total_bytes(),
                        profile = %policy.throttled_profile,
                        "fair-use limit reached; session throttled"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(mac = %session.mac, error = %e, "failed to apply fair-use profile");
                }
            }
        }
        report
    }

    // ── Operator actions ─────────────────────────────────────────────

    /// Revoke one voucher's access now and mark it reclaimed.
    ///
    /// The binding survives a failed revoke so the operator can retry.
    pub async fn revoke_code(&self, code: &VoucherCode) -> CoreResult<Voucher> {
        let voucher = self
            .inner
            .store
            .find_by_code(code)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                code: code.to_string(),
            })?;
        let Some(mac) = voucher.bound_mac.clone() else {
            return Err(CoreError::NotPermitted {
                reason: format!("voucher {code} is not bound to any device"),
            });
        };

        if !self.held_by_other_active(&voucher, &mac).await? {
            self.inner.gateway.revoke(&mac).await?;
        }
        self.inner.store.clear_binding(voucher.id, &mac).await?;
        info!(%code, %mac, "access revoked by operator");

        self.inner
            .store
            .find_by_code(code)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                code: code.to_string(),
            })
    }

    /// Release a developer voucher from the operator side.
    ///
    /// Unlike the portal path this revokes first and only then resets the
    /// voucher, so a failed revoke leaves everything as it was.
    pub async fn end_developer_session(&self, code: &VoucherCode) -> CoreResult<Voucher> {
        let voucher = self
            .inner
            .store
            .find_by_code(code)
            .await?
            .ok_or_else(|| CoreError::NotFound {
                code: code.to_string(),
            })?;
        if !voucher.is_developer {
            return Err(CoreError::NotPermitted {
                reason: format!("{code} is not a developer voucher"),
            });
        }
        if let Some(mac) = voucher.bound_mac.as_ref() {
            if !self.held_by_other_active(&voucher, mac).await? {
                self.inner.gateway.revoke(mac).await?;
            }
        }

        let (previous, released) = self
            .inner
            .store
            .update_atomically(code, lifecycle::end_session)
            .await?;
        if let Some(mac) = previous {
            info!(%code, %mac, "developer session ended by operator");
        }
        Ok(released)
    }

    /// Revoke and reclaim every bound voucher, developer vouchers included.
    pub async fn revoke_all(&self) -> SweepReport {
        let bound = match self.inner.store.find_bound().await {
            Ok(bound) => bound,
            Err(e) => {
                warn!(error = %e, "revoke-all: cannot read vouchers");
                return SweepReport::default();
            }
        };
        let mut report = SweepReport {
            examined: bound.len(),
            ..SweepReport::default()
        };
        for voucher in bound {
            if self.revoke_and_clear(&voucher, "operator revoke-all").await {
                report.succeeded += 1;
            } else {
                report.failed += 1;
            }
        }
        report
    }

    /// Withdraw every gateway grant but keep the bindings.
    ///
    /// Used when the service goes offline: grants are cleared so nobody
    /// browses unsupervised, and the authorization sweep restores the
    /// remaining time on the next start. A MAC holding several vouchers is
    /// revoked once and every one of them loses its recorded grant.
    pub async fn withdraw_all(&self) -> SweepReport {
        let bound = match self.inner.store.find_bound().await {
            Ok(bound) => bound,
            Err(e) => {
                warn!(error = %e, "withdraw: cannot read vouchers");
                return SweepReport::default();
            }
        };
        let mut report = SweepReport {
            examined: bound.len(),
            ..SweepReport::default()
        };
        let mut withdrawn: HashSet<MacAddress> = HashSet::new();
        for voucher in bound {
            let Some(mac) = voucher.bound_mac.as_ref() else {
                continue;
            };
            let revoked = if withdrawn.contains(mac) {
                Ok(())
            } else {
                self.inner.gateway.revoke(mac).await
            };
            match revoked {
                Ok(()) => {
                    withdrawn.insert(mac.clone());
                    if let Err(e) = self.inner.store.clear_authorization(voucher.id, mac).await {
                        warn!(code = %voucher.code, error = %e, "withdrawn but grant not cleared");
                    }
                    report.succeeded += 1;
                }
                Err(e) => {
                    warn!(code = %voucher.code, %mac, error = %e, "withdraw failed");
                    report.failed += 1;
                }
            }
        }
        report
    }
}
