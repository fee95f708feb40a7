// ── Voucher persistence ──
//
// `VoucherStore` is the only path to voucher rows. Every mutation that
// depends on the current row (activation, developer reset) goes through a
// single atomic read-modify-write so two concurrent requests for the same
// code cannot both win.
//
// Time-dependent queries take `now` and filter with the lifecycle
// predicates, so "active" and "expired" mean exactly one thing everywhere.

mod memory;
mod sqlite;

use chrono::{DateTime, Utc};

use crate::error::CoreResult;
use crate::lifecycle::{self, Activation};
use crate::model::{MacAddress, NewVoucher, Price, Voucher, VoucherCode, VoucherState};

pub use memory::MemoryVoucherStore;
pub use sqlite::SqliteVoucherStore;

/// Filter for [`VoucherStore::list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub state: Option<VoucherState>,
    pub limit: Option<usize>,
}

/// Voucher counts per derived state, plus revenue from activated vouchers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatusCounts {
    pub total: u64,
    pub unused: u64,
    pub active: u64,
    pub expired: u64,
    pub reclaimed: u64,
    pub revenue: Price,
}

impl StatusCounts {
    /// Tally a set of vouchers at `now`.
    pub fn tally<'a>(vouchers: impl IntoIterator<Item = &'a Voucher>, now: DateTime<Utc>) -> Self {
        let mut counts = Self::default();
        for v in vouchers {
            counts.total += 1;
            match lifecycle::state_at(v, now) {
                VoucherState::Unused => counts.unused += 1,
                VoucherState::Active => counts.active += 1,
                VoucherState::Expired => counts.expired += 1,
                VoucherState::Reclaimed => counts.reclaimed += 1,
            }
            if v.is_activated() {
                counts.revenue = counts.revenue.saturating_add(v.price);
            }
        }
        counts
    }
}

/// Durable voucher storage.
pub trait VoucherStore: Send + Sync + 'static {
    /// Issue a new voucher. Fails with `DuplicateCode` if the code exists.
    fn insert(&self, new: NewVoucher) -> impl Future<Output = CoreResult<Voucher>> + Send;

    fn get(&self, id: i64) -> impl Future<Output = CoreResult<Option<Voucher>>> + Send;

    fn find_by_code(
        &self,
        code: &VoucherCode,
    ) -> impl Future<Output = CoreResult<Option<Voucher>>> + Send;

    /// Every voucher currently bound to `mac`, whatever its state.
    fn find_bound_to_mac(
        &self,
        mac: &MacAddress,
    ) -> impl Future<Output = CoreResult<Vec<Voucher>>> + Send;

    /// Non-developer vouchers past expiry whose binding is still set.
    fn find_expired_still_bound(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = CoreResult<Vec<Voucher>>> + Send;

    /// Active vouchers whose gateway grant is not yet confirmed.
    fn find_pending_authorization(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = CoreResult<Vec<Voucher>>> + Send;

    /// Every voucher with a MAC binding, including developer vouchers.
    fn find_bound(&self) -> impl Future<Output = CoreResult<Vec<Voucher>>> + Send;

    /// Vouchers newest first, optionally filtered by derived state.
    fn list(
        &self,
        filter: ListFilter,
        now: DateTime<Utc>,
    ) -> impl Future<Output = CoreResult<Vec<Voucher>>> + Send;

    fn count_by_status(
        &self,
        now: DateTime<Utc>,
    ) -> impl Future<Output = CoreResult<StatusCounts>> + Send;

    /// Atomically activate `code` for `mac` (see [`lifecycle::activate`]).
    ///
    /// The check that `mac` holds no other active voucher runs inside the
    /// same transaction as the update.
    fn activate(
        &self,
        code: &VoucherCode,
        mac: &MacAddress,
        now: DateTime<Utc>,
    ) -> impl Future<Output = CoreResult<(Activation, Voucher)>> + Send;

    /// Apply `f` to the row for `code` and persist the result atomically.
    ///
    /// If `f` returns an error the row is left untouched.
    fn update_atomically<T, F>(
        &self,
        code: &VoucherCode,
        f: F,
    ) -> impl Future<Output = CoreResult<(T, Voucher)>> + Send
    where
        F: FnOnce(&mut Voucher) -> CoreResult<T> + Send + 'static,
        T: Send + 'static;

    /// Record a confirmed gateway grant, if the voucher is still bound to `mac`.
    fn mark_authorized(
        &self,
        id: i64,
        mac: &MacAddress,
        at: DateTime<Utc>,
    ) -> impl Future<Output = CoreResult<bool>> + Send;

    /// Forget a confirmed grant (the binding stays), if still bound to `mac`.
    fn clear_authorization(
        &self,
        id: i64,
        mac: &MacAddress,
    ) -> impl Future<Output = CoreResult<bool>> + Send;

    /// Clear the binding, but only if it still points at `mac`.
    ///
    /// Returns `false` when the binding changed since the caller read it.
    fn clear_binding(
        &self,
        id: i64,
        mac: &MacAddress,
    ) -> impl Future<Output = CoreResult<bool>> + Send;

    /// Delete every voucher. Returns the number of rows removed.
    fn delete_all(&self) -> impl Future<Output = CoreResult<u64>> + Send;
}

/// Newest first, then filter and cap. Shared by both backends.
fn apply_filter(mut vouchers: Vec<Voucher>, filter: ListFilter, now: DateTime<Utc>) -> Vec<Voucher> {
    vouchers.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    if let Some(state) = filter.state {
        vouchers.retain(|v| lifecycle::state_at(v, now) == state);
    }
    if let Some(limit) = filter.limit {
        vouchers.truncate(limit);
    }
    vouchers
}
