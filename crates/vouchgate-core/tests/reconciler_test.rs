// Reconciler behaviour against a recording fake gateway.
#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use pretty_assertions::assert_eq;

use common::{Harness, mac, one_hour_plan, session};
use vouchgate_core::lifecycle;
use vouchgate_core::{
    Clock, CoreError, FupPolicy, Issuer, ReconcilerConfig, SweepReport, Voucher, VoucherState,
    VoucherStore,
};

async fn issue_and_activate(h: &Harness, mac_str: &str) -> Voucher {
    let issued = Issuer::new(Arc::clone(&h.store))
        .issue_one(&one_hour_plan())
        .await
        .unwrap();
    let (_, voucher) = h
        .store
        .activate(&issued.code, &mac(mac_str), h.clock.now())
        .await
        .unwrap();
    voucher
}

// ── Expiry ──────────────────────────────────────────────────────────

#[tokio::test]
async fn expired_voucher_is_revoked_then_reclaimed() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:01");
    let v = issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;

    h.reconciler.authorization_sweep().await;
    assert_eq!(h.gateway.granted_secs(&m), Some(3_600));

    // One second before expiry nothing happens.
    h.clock.advance(TimeDelta::seconds(3_599));
    assert_eq!(h.reconciler.expiry_sweep().await, SweepReport::default());
    assert!(h.gateway.is_granted(&m));

    h.clock.advance(TimeDelta::seconds(1));
    let report = h.reconciler.expiry_sweep().await;

    assert_eq!(report.succeeded, 1);
    assert!(!h.gateway.is_granted(&m));
    let stored = h.store.find_by_code(&v.code).await.unwrap().unwrap();
    assert_eq!(stored.bound_mac, None);
    assert_eq!(
        lifecycle::state_at(&stored, h.clock.now()),
        VoucherState::Reclaimed
    );
}

#[tokio::test]
async fn expiry_sweep_is_idempotent() {
    let h = Harness::new();
    issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;
    h.clock.advance(TimeDelta::hours(2));

    h.reconciler.expiry_sweep().await;
    let calls = h.gateway.revoke_calls();
    let second = h.reconciler.expiry_sweep().await;

    assert_eq!(second, SweepReport::default());
    assert_eq!(h.gateway.revoke_calls(), calls);
}

#[tokio::test]
async fn failed_revoke_keeps_binding_until_gateway_returns() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:01");
    let v = issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;
    h.reconciler.authorization_sweep().await;
    h.clock.advance(TimeDelta::hours(1));

    h.gateway.set_offline(true);
    let report = h.reconciler.expiry_sweep().await;
    assert_eq!(report.failed, 1);
    let stored = h.store.find_by_code(&v.code).await.unwrap().unwrap();
    assert_eq!(stored.bound_mac.as_ref(), Some(&m));

    h.gateway.set_offline(false);
    let report = h.reconciler.expiry_sweep().await;
    assert_eq!(report.succeeded, 1);
    assert!(!h.gateway.is_granted(&m));
    let stored = h.store.find_by_code(&v.code).await.unwrap().unwrap();
    assert_eq!(stored.bound_mac, None);
}

#[tokio::test]
async fn developer_voucher_is_never_swept() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:0D");
    let dev = Issuer::new(Arc::clone(&h.store))
        .create_developer("DEV1")
        .await
        .unwrap();
    h.store
        .activate(&dev.code, &m, h.clock.now())
        .await
        .unwrap();
    h.reconciler.authorization_sweep().await;

    h.clock.advance(TimeDelta::days(3_650));
    let report = h.reconciler.expiry_sweep().await;

    assert_eq!(report, SweepReport::default());
    assert!(h.gateway.is_granted(&m));
}

#[tokio::test]
async fn successor_voucher_keeps_grant_when_predecessor_expires() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:01");
    let first = issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;
    h.reconciler.authorization_sweep().await;

    // The first voucher runs out and the same device buys another before
    // the expiry sweep gets to it.
    h.clock.advance(TimeDelta::seconds(3_605));
    let second = issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;
    h.reconciler.authorization_sweep().await;
    assert_eq!(h.gateway.granted_secs(&m), Some(3_600));

    let report = h.reconciler.run_sweep().await;

    assert_eq!(report.succeeded, 1);
    assert_eq!(h.gateway.revoke_calls(), 0);
    assert_eq!(h.gateway.granted_secs(&m), Some(3_600));
    let expired = h.store.find_by_code(&first.code).await.unwrap().unwrap();
    assert_eq!(expired.bound_mac, None);
    let live = h.store.find_by_code(&second.code).await.unwrap().unwrap();
    assert_eq!(live.bound_mac.as_ref(), Some(&m));
    assert!(live.authorized_at.is_some());

    // Nothing left for a second pass to take down.
    assert_eq!(h.reconciler.run_sweep().await, SweepReport::default());
    assert!(h.gateway.is_granted(&m));
}

#[tokio::test]
async fn paid_expiry_spares_developer_grant_on_same_mac() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:0D");
    let dev = Issuer::new(Arc::clone(&h.store))
        .create_developer("DEV1")
        .await
        .unwrap();
    h.store.activate(&dev.code, &m, h.clock.now()).await.unwrap();
    let paid = issue_and_activate(&h, "AA:BB:CC:DD:EE:0D").await;
    h.reconciler.authorization_sweep().await;

    h.clock.advance(TimeDelta::hours(1));
    let report = h.reconciler.expiry_sweep().await;

    assert_eq!(report.succeeded, 1);
    assert_eq!(h.gateway.revoke_calls(), 0);
    assert!(h.gateway.is_granted(&m));
    let reclaimed = h.store.find_by_code(&paid.code).await.unwrap().unwrap();
    assert_eq!(
        lifecycle::state_at(&reclaimed, h.clock.now()),
        VoucherState::Reclaimed
    );
    let kept = h.store.find_by_code(&dev.code).await.unwrap().unwrap();
    assert_eq!(kept.bound_mac.as_ref(), Some(&m));
    assert!(kept.authorized_at.is_some());
}

#[tokio::test]
async fn releasing_developer_voucher_spares_paid_grant_on_same_mac() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:0D");
    let paid = issue_and_activate(&h, "AA:BB:CC:DD:EE:0D").await;
    let dev = Issuer::new(Arc::clone(&h.store))
        .create_developer("DEV1")
        .await
        .unwrap();
    h.store.activate(&dev.code, &m, h.clock.now()).await.unwrap();
    h.reconciler.authorization_sweep().await;

    h.reconciler.end_developer_session(&dev.code).await.unwrap();

    assert_eq!(h.gateway.revoke_calls(), 0);
    assert!(h.gateway.is_granted(&m));
    let live = h.store.find_by_code(&paid.code).await.unwrap().unwrap();
    assert_eq!(
        lifecycle::state_at(&live, h.clock.now()),
        VoucherState::Active
    );
}

// ── Authorization ───────────────────────────────────────────────────

#[tokio::test]
async fn authorization_retries_after_outage_with_remaining_time() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:01");
    let v = issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;

    h.gateway.set_offline(true);
    assert_eq!(h.reconciler.authorization_sweep().await.failed, 1);
    assert!(!h.gateway.is_granted(&m));

    // Ten minutes later the router is back; only the remainder is granted.
    h.clock.advance(TimeDelta::minutes(10));
    h.gateway.set_offline(false);
    assert_eq!(h.reconciler.authorization_sweep().await.succeeded, 1);
    assert_eq!(h.gateway.granted_secs(&m), Some(3_000));

    let stored = h.store.find_by_code(&v.code).await.unwrap().unwrap();
    assert!(stored.authorized_at.is_some());
    assert_eq!(h.reconciler.authorization_sweep().await, SweepReport::default());
}

#[tokio::test]
async fn authorize_voucher_skips_confirmed_grants() {
    let h = Harness::new();
    let v = issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;

    assert!(h.reconciler.authorize_voucher(v.id).await.unwrap());
    assert!(!h.reconciler.authorize_voucher(v.id).await.unwrap());
    assert_eq!(h.gateway.authorize_calls(), 1);

    let err = h.reconciler.authorize_voucher(9_999).await.unwrap_err();
    assert!(err.is_not_found());
}

// ── Fair use ────────────────────────────────────────────────────────

fn fup_config() -> ReconcilerConfig {
    ReconcilerConfig {
        fup: Some(FupPolicy {
            threshold_bytes: 1_000,
            throttled_profile: "throttled".into(),
        }),
        ..ReconcilerConfig::default()
    }
}

#[tokio::test]
async fn usage_sweep_throttles_each_heavy_user_once() {
    let h = Harness::with_config(fup_config());
    let heavy = mac("AA:BB:CC:DD:EE:01");
    let light = mac("AA:BB:CC:DD:EE:02");
    h.gateway.set_sessions(vec![
        session("AA:BB:CC:DD:EE:01", 800, 400),
        session("AA:BB:CC:DD:EE:02", 10, 10),
    ]);

    let first = h.reconciler.usage_sweep().await;
    assert_eq!(first.sessions, 2);
    assert_eq!(first.throttled, 1);
    assert_eq!(h.gateway.profile_of(&heavy).as_deref(), Some("throttled"));
    assert_eq!(h.gateway.profile_of(&light), None);

    let second = h.reconciler.usage_sweep().await;
    assert_eq!(second.throttled, 0);
    assert_eq!(h.reconciler.throttled_macs(), vec![heavy]);
}

#[tokio::test]
async fn usage_sweep_isolates_per_user_failures() {
    let h = Harness::with_config(fup_config());
    let broken = mac("AA:BB:CC:DD:EE:01");
    let fine = mac("AA:BB:CC:DD:EE:02");
    h.gateway.reject_profile_for(broken.clone());
    h.gateway.set_sessions(vec![
        session("AA:BB:CC:DD:EE:01", 5_000, 0),
        session("AA:BB:CC:DD:EE:02", 5_000, 0),
    ]);

    let report = h.reconciler.usage_sweep().await;

    assert_eq!(report.failed, 1);
    assert_eq!(report.throttled, 1);
    assert_eq!(h.gateway.profile_of(&fine).as_deref(), Some("throttled"));
    assert_eq!(h.reconciler.throttled_macs(), vec![fine]);
}

#[tokio::test]
async fn throttle_is_forgotten_once_session_ends() {
    let h = Harness::with_config(fup_config());
    h.gateway
        .set_sessions(vec![session("AA:BB:CC:DD:EE:01", 5_000, 0)]);
    h.reconciler.usage_sweep().await;
    assert_eq!(h.reconciler.throttled_macs().len(), 1);

    h.gateway.set_sessions(Vec::new());
    h.reconciler.usage_sweep().await;
    assert!(h.reconciler.throttled_macs().is_empty());
}

#[tokio::test]
async fn usage_sweep_without_policy_does_nothing() {
    let h = Harness::new();
    h.gateway
        .set_sessions(vec![session("AA:BB:CC:DD:EE:01", u64::MAX, 0)]);

    let report = h.reconciler.usage_sweep().await;

    assert_eq!(report.sessions, 0);
    assert_eq!(h.gateway.profile_of(&mac("AA:BB:CC:DD:EE:01")), None);
}

// ── Operator actions ────────────────────────────────────────────────

#[tokio::test]
async fn revoke_code_reclaims_voucher() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:01");
    let v = issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;
    h.reconciler.authorization_sweep().await;

    let revoked = h.reconciler.revoke_code(&v.code).await.unwrap();

    assert_eq!(revoked.bound_mac, None);
    assert!(!h.gateway.is_granted(&m));

    let again = h.reconciler.revoke_code(&v.code).await.unwrap_err();
    assert!(matches!(again, CoreError::NotPermitted { .. }));
}

#[tokio::test]
async fn revoke_code_during_outage_keeps_binding() {
    let h = Harness::new();
    let v = issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;
    h.gateway.set_offline(true);

    let err = h.reconciler.revoke_code(&v.code).await.unwrap_err();

    assert!(err.is_retryable());
    let stored = h.store.find_by_code(&v.code).await.unwrap().unwrap();
    assert!(stored.bound_mac.is_some());
}

#[tokio::test]
async fn revoke_all_includes_developer_vouchers() {
    let h = Harness::new();
    issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;
    let dev = Issuer::new(Arc::clone(&h.store))
        .create_developer("DEV1")
        .await
        .unwrap();
    h.store
        .activate(&dev.code, &mac("AA:BB:CC:DD:EE:0D"), h.clock.now())
        .await
        .unwrap();

    let report = h.reconciler.revoke_all().await;

    assert_eq!(report.examined, 2);
    assert_eq!(report.succeeded, 2);
    assert!(h.store.find_bound().await.unwrap().is_empty());
}

#[tokio::test]
async fn revoke_all_revokes_shared_mac_once_its_last_voucher_goes() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:0D");
    let dev = Issuer::new(Arc::clone(&h.store))
        .create_developer("DEV1")
        .await
        .unwrap();
    h.store.activate(&dev.code, &m, h.clock.now()).await.unwrap();
    issue_and_activate(&h, "AA:BB:CC:DD:EE:0D").await;
    h.reconciler.authorization_sweep().await;

    let report = h.reconciler.revoke_all().await;

    assert_eq!(report.succeeded, 2);
    assert_eq!(h.gateway.revoke_calls(), 1);
    assert!(!h.gateway.is_granted(&m));
    assert!(h.store.find_bound().await.unwrap().is_empty());
}

#[tokio::test]
async fn withdraw_all_revokes_shared_mac_once() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:0D");
    let dev = Issuer::new(Arc::clone(&h.store))
        .create_developer("DEV1")
        .await
        .unwrap();
    h.store.activate(&dev.code, &m, h.clock.now()).await.unwrap();
    issue_and_activate(&h, "AA:BB:CC:DD:EE:0D").await;
    h.reconciler.authorization_sweep().await;

    let report = h.reconciler.withdraw_all().await;

    assert_eq!(report.succeeded, 2);
    assert_eq!(h.gateway.revoke_calls(), 1);
    let bound = h.store.find_bound().await.unwrap();
    assert_eq!(bound.len(), 2);
    assert!(bound.iter().all(|v| v.authorized_at.is_none()));

    // Both come back on the next start.
    h.reconciler.authorization_sweep().await;
    assert!(h.gateway.is_granted(&m));
}

#[tokio::test]
async fn withdraw_all_keeps_bindings_for_next_start() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:01");
    let v = issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;
    h.reconciler.authorization_sweep().await;

    let report = h.reconciler.withdraw_all().await;
    assert_eq!(report.succeeded, 1);
    assert!(!h.gateway.is_granted(&m));

    let stored = h.store.find_by_code(&v.code).await.unwrap().unwrap();
    assert_eq!(stored.bound_mac.as_ref(), Some(&m));
    assert!(stored.authorized_at.is_none());

    // Next start: the authorization sweep restores the remaining time.
    h.clock.advance(TimeDelta::minutes(15));
    h.reconciler.authorization_sweep().await;
    assert_eq!(h.gateway.granted_secs(&m), Some(2_700));
}

// ── Background task ─────────────────────────────────────────────────

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn running_reconciler_grants_then_expires() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:01");
    let running = h.reconciler.start();
    let handle = running.handle();
    settle().await;

    let v = issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;
    handle.request_authorization(v.id);
    settle().await;
    assert_eq!(h.gateway.granted_secs(&m), Some(3_600));

    h.clock.advance(TimeDelta::hours(1));
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(!h.gateway.is_granted(&m));
    assert!(h.gateway.revoked().contains(&m));

    assert_eq!(running.shutdown().await, None);
}

#[tokio::test(start_paused = true)]
async fn shutdown_can_withdraw_every_grant() {
    let h = Harness::with_config(ReconcilerConfig {
        revoke_on_shutdown: true,
        ..ReconcilerConfig::default()
    });
    let m = mac("AA:BB:CC:DD:EE:01");
    issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;
    let running = h.reconciler.start();
    running.handle().sweep_now();
    settle().await;
    assert!(h.gateway.is_granted(&m));

    let report = running.shutdown().await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert!(!h.gateway.is_granted(&m));
}

#[tokio::test(start_paused = true)]
async fn revocation_request_during_outage_becomes_orphan() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:0D");
    h.gateway.seed_grant(m.clone(), 60);
    h.gateway.set_offline(true);
    let running = h.reconciler.start();
    settle().await;

    running.handle().request_revocation(m.clone());
    settle().await;
    assert_eq!(h.reconciler.pending_orphans(), vec![m.clone()]);

    h.gateway.set_offline(false);
    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(h.reconciler.pending_orphans().is_empty());
    assert!(!h.gateway.is_granted(&m));

    running.shutdown().await;
}

#[tokio::test]
async fn revocation_skipped_when_mac_holds_an_active_voucher() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:01");
    issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;
    h.reconciler.authorization_sweep().await;

    // A stale revocation for a MAC that has since claimed a new voucher.
    let running = h.reconciler.start();
    running.handle().request_revocation(m.clone());
    running.shutdown().await;

    assert_eq!(h.gateway.revoke_calls(), 0);
    assert!(h.gateway.is_granted(&m));
}

#[tokio::test]
async fn operator_releases_developer_voucher() {
    let h = Harness::new();
    let m = mac("AA:BB:CC:DD:EE:0D");
    let dev = Issuer::new(Arc::clone(&h.store))
        .create_developer("DEV1")
        .await
        .unwrap();
    h.store.activate(&dev.code, &m, h.clock.now()).await.unwrap();
    h.reconciler.authorization_sweep().await;

    h.gateway.set_offline(true);
    assert!(h.reconciler.end_developer_session(&dev.code).await.is_err());
    let kept = h.store.find_by_code(&dev.code).await.unwrap().unwrap();
    assert_eq!(kept.bound_mac.as_ref(), Some(&m));

    h.gateway.set_offline(false);
    let released = h.reconciler.end_developer_session(&dev.code).await.unwrap();
    assert_eq!(released.bound_mac, None);
    assert_eq!(released.activated_at, None);
    assert!(!h.gateway.is_granted(&m));
}

#[tokio::test]
async fn operator_release_refuses_paid_voucher() {
    let h = Harness::new();
    let v = issue_and_activate(&h, "AA:BB:CC:DD:EE:01").await;

    let err = h.reconciler.end_developer_session(&v.code).await.unwrap_err();

    assert!(matches!(err, CoreError::NotPermitted { .. }));
}
