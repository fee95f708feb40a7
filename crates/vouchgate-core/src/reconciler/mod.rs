// ── Access reconciler ──
//
// Owns every gateway mutation made on behalf of vouchers. One background
// task multiplexes three inputs:
//
//   - the sweep tick: revoke expired grants, retry pending authorizations,
//     retry orphaned revocations
//   - the usage tick: fair-use throttling (only when a policy is set)
//   - requests from portal handlers: immediate authorize / revoke nudges
//
// Handlers never wait on the gateway. A request that cannot be queued is
// not lost: the next sweep derives the same work from the store.

mod sweep;

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::ReconcilerConfig;
use crate::gateway::GatewayClient;
use crate::model::MacAddress;
use crate::store::VoucherStore;

const REQUEST_CHANNEL_SIZE: usize = 256;
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Outcome of one pass over a set of vouchers or MACs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub examined: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl SweepReport {
    fn merge(&mut self, other: Self) {
        self.examined += other.examined;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
    }

    pub fn is_idle(&self) -> bool {
        self.examined == 0
    }
}

/// Outcome of one fair-use pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub sessions: usize,
    pub throttled: usize,
    pub failed: usize,
}

#[derive(Debug)]
enum Request {
    Authorize(i64),
    Revoke(MacAddress),
    SweepNow,
}

/// Gateway reconciliation over a voucher store.
///
/// Cheap to clone; clones share state. The sweep methods are public so the
/// CLI can run one-shot passes without starting the background task.
pub struct Reconciler<S, G> {
    inner: Arc<ReconcilerInner<S, G>>,
}

struct ReconcilerInner<S, G> {
    store: Arc<S>,
    gateway: Arc<G>,
    clock: Arc<dyn Clock>,
    config: ReconcilerConfig,
    /// MACs moved to the fair-use profile, until they leave the active list.
    throttled: Mutex<HashSet<MacAddress>>,
    /// MACs whose binding was cleared but whose revoke has not succeeded.
    orphans: Mutex<HashSet<MacAddress>>,
}

impl<S, G> Clone for Reconciler<S, G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<S: VoucherStore, G: GatewayClient> Reconciler<S, G> {
    pub fn new(
        store: Arc<S>,
        gateway: Arc<G>,
        clock: Arc<dyn Clock>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ReconcilerInner {
                store,
                gateway,
                clock,
                config,
                throttled: Mutex::new(HashSet::new()),
                orphans: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.inner.config
    }

    /// MACs still waiting for a successful revoke after their binding was cleared.
    pub fn pending_orphans(&self) -> Vec<MacAddress> {
        let mut macs: Vec<_> = locked(&self.inner.orphans).iter().cloned().collect();
        macs.sort();
        macs
    }

    /// MACs currently on the fair-use profile.
    pub fn throttled_macs(&self) -> Vec<MacAddress> {
        let mut macs: Vec<_> = locked(&self.inner.throttled).iter().cloned().collect();
        macs.sort();
        macs
    }

    pub(crate) fn remember_orphan(&self, mac: MacAddress) {
        locked(&self.inner.orphans).insert(mac);
    }

    /// Spawn the background task.
    pub fn start(&self) -> RunningReconciler<S, G> {
        let (tx, rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(reconcile_task(self.clone(), rx, cancel.clone()));
        info!(
            sweep_secs = self.config().sweep_interval.as_secs(),
            usage_secs = self.config().usage_interval.as_secs(),
            fair_use = self.config().fup.is_some(),
            "reconciler started"
        );
        RunningReconciler {
            handle: ReconcilerHandle {
                tx,
                reconciler: self.clone(),
            },
            cancel,
            task,
        }
    }

    async fn handle_request(&self, request: Request) {
        match request {
            Request::Authorize(id) => {
                if let Err(e) = self.authorize_voucher(id).await {
                    warn!(voucher_id = id, error = %e, "immediate authorization failed");
                }
            }
            Request::Revoke(mac) => {
                self.revoke_orphan(mac).await;
            }
            Request::SweepNow => {
                self.run_sweep().await;
            }
        }
    }

    /// Expiry, then orphan retry, then pending authorizations.
    pub async fn run_sweep(&self) -> SweepReport {
        let mut report = self.expiry_sweep().await;
        report.merge(self.orphan_sweep().await);
        report.merge(self.authorization_sweep().await);
        if report.is_idle() {
            debug!("sweep: nothing to do");
        } else {
            info!(
                examined = report.examined,
                succeeded = report.succeeded,
                failed = report.failed,
                "sweep finished"
            );
        }
        report
    }
}

// ── Handles ─────────────────────────────────────────────────────────

/// Non-blocking requests into a running reconciler.
pub struct ReconcilerHandle<S, G> {
    tx: mpsc::Sender<Request>,
    reconciler: Reconciler<S, G>,
}

impl<S, G> Clone for ReconcilerHandle<S, G> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            reconciler: self.reconciler.clone(),
        }
    }
}

impl<S: VoucherStore, G: GatewayClient> ReconcilerHandle<S, G> {
    /// Ask for an immediate grant for a freshly activated voucher.
    ///
    /// If the queue is full the authorization sweep covers it.
    pub fn request_authorization(&self, voucher_id: i64) {
        if let Err(e) = self.tx.try_send(Request::Authorize(voucher_id)) {
            debug!(voucher_id, reason = %e, "authorization deferred to next sweep");
        }
    }

    /// Ask for the grant of a MAC whose binding was just cleared to be withdrawn.
    pub fn request_revocation(&self, mac: MacAddress) {
        if let Err(e) = self.tx.try_send(Request::Revoke(mac.clone())) {
            debug!(%mac, reason = %e, "revocation deferred to next sweep");
            self.reconciler.remember_orphan(mac);
        }
    }

    /// Run a full sweep as soon as the task is free.
    pub fn sweep_now(&self) {
        if self.tx.try_send(Request::SweepNow).is_err() {
            debug!("sweep request dropped; one is already pending");
        }
    }

    pub fn reconciler(&self) -> &Reconciler<S, G> {
        &self.reconciler
    }
}

/// The spawned task plus its handle.
pub struct RunningReconciler<S, G> {
    handle: ReconcilerHandle<S, G>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl<S: VoucherStore, G: GatewayClient> RunningReconciler<S, G> {
    pub fn handle(&self) -> ReconcilerHandle<S, G> {
        self.handle.clone()
    }

    /// Stop after the current tick finishes.
    ///
    /// Requests already queued are still processed. When the config asks for
    /// it, every gateway grant is withdrawn before returning.
    pub async fn shutdown(self) -> Option<SweepReport> {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "reconciler task ended abnormally");
        }

        let reconciler = self.handle.reconciler;
        if !reconciler.config().revoke_on_shutdown {
            info!("reconciler stopped");
            return None;
        }
        let report = reconciler.withdraw_all().await;
        info!(
            withdrawn = report.succeeded,
            failed = report.failed,
            "reconciler stopped; gateway grants withdrawn"
        );
        Some(report)
    }
}

// ── Background task ─────────────────────────────────────────────────

fn ticker(period: Duration) -> tokio::time::Interval {
    // The first tick fires immediately: a restart sweeps right away.
    let mut interval = tokio::time::interval(period.max(MIN_INTERVAL));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn reconcile_task<S: VoucherStore, G: GatewayClient>(
    reconciler: Reconciler<S, G>,
    mut rx: mpsc::Receiver<Request>,
    cancel: CancellationToken,
) {
    let mut sweep = ticker(reconciler.config().sweep_interval);
    let mut usage = ticker(reconciler.config().usage_interval);
    let fair_use = reconciler.config().fup.is_some();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(request) = rx.recv() => reconciler.handle_request(request).await,
            _ = sweep.tick() => {
                reconciler.run_sweep().await;
            }
            _ = usage.tick(), if fair_use => {
                reconciler.usage_sweep().await;
            }
        }
    }

    rx.close();
    while let Ok(request) = rx.try_recv() {
        reconciler.handle_request(request).await;
    }
}
