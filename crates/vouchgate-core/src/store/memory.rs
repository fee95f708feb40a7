// In-memory voucher store
//
// Backs the test suites and `serve --ephemeral`. Read-modify-write
// operations serialize on one mutex; plain reads go straight to the map.

use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{ListFilter, StatusCounts, VoucherStore, apply_filter};
use crate::error::{CoreError, CoreResult};
use crate::lifecycle::{self, Activation};
use crate::model::{MacAddress, NewVoucher, Voucher, VoucherCode};

/// `DashMap`-backed [`VoucherStore`]. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryVoucherStore {
    by_code: DashMap<VoucherCode, Voucher>,
    next_id: AtomicI64,
    write_lock: Mutex<()>,
}

impl MemoryVoucherStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self, keep: impl Fn(&Voucher) -> bool) -> Vec<Voucher> {
        self.by_code
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn lock(&self) -> CoreResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| CoreError::Internal("memory store lock poisoned".into()))
    }

    /// Apply `f` to the row for `code`; the row only changes if `f` succeeds.
    fn modify<T>(
        &self,
        code: &VoucherCode,
        f: impl FnOnce(&mut Voucher) -> CoreResult<T>,
    ) -> CoreResult<(T, Voucher)> {
        let mut entry = self.by_code.get_mut(code).ok_or_else(|| CoreError::NotFound {
            code: code.to_string(),
        })?;
        let mut working = entry.value().clone();
        let out = f(&mut working)?;
        *entry.value_mut() = working.clone();
        Ok((out, working))
    }

    /// Apply `f` to the row with `id` if it is still bound to `mac`.
    fn modify_if_bound(&self, id: i64, mac: &MacAddress, f: impl FnOnce(&mut Voucher)) -> bool {
        let Some(mut entry) = self
            .by_code
            .iter_mut()
            .find(|entry| entry.value().id == id)
        else {
            return false;
        };
        if entry.value().bound_mac.as_ref() != Some(mac) {
            return false;
        }
        f(entry.value_mut());
        true
    }
}

impl VoucherStore for MemoryVoucherStore {
    async fn insert(&self, new: NewVoucher) -> CoreResult<Voucher> {
        let _guard = self.lock()?;
        if self.by_code.contains_key(&new.code) {
            return Err(CoreError::DuplicateCode {
                code: new.code.to_string(),
            });
        }
        let voucher = Voucher {
            id: self.next_id.fetch_add(1, Ordering::Relaxed) + 1,
            code: new.code.clone(),
            duration_secs: new.duration_secs,
            price: new.price,
            plan: new.plan,
            is_developer: new.is_developer,
            created_at: Utc::now(),
            activated_at: None,
            expires_at: None,
            bound_mac: None,
            authorized_at: None,
        };
        self.by_code.insert(new.code, voucher.clone());
        Ok(voucher)
    }

    async fn get(&self, id: i64) -> CoreResult<Option<Voucher>> {
        Ok(self.snapshot(|v| v.id == id).pop())
    }

    async fn find_by_code(&self, code: &VoucherCode) -> CoreResult<Option<Voucher>> {
        Ok(self.by_code.get(code).map(|entry| entry.value().clone()))
    }

    async fn find_bound_to_mac(&self, mac: &MacAddress) -> CoreResult<Vec<Voucher>> {
        Ok(self.snapshot(|v| v.bound_mac.as_ref() == Some(mac)))
    }

    async fn find_expired_still_bound(&self, now: DateTime<Utc>) -> CoreResult<Vec<Voucher>> {
        Ok(self.snapshot(|v| lifecycle::needs_revocation(v, now)))
    }

    async fn find_pending_authorization(&self, now: DateTime<Utc>) -> CoreResult<Vec<Voucher>> {
        Ok(self.snapshot(|v| lifecycle::needs_authorization(v, now)))
    }

    async fn find_bound(&self) -> CoreResult<Vec<Voucher>> {
        Ok(self.snapshot(|v| v.bound_mac.is_some()))
    }

    async fn list(&self, filter: ListFilter, now: DateTime<Utc>) -> CoreResult<Vec<Voucher>> {
        Ok(apply_filter(self.snapshot(|_| true), filter, now))
    }

    async fn count_by_status(&self, now: DateTime<Utc>) -> CoreResult<StatusCounts> {
        Ok(StatusCounts::tally(&self.snapshot(|_| true), now))
    }

    async fn activate(
        &self,
        code: &VoucherCode,
        mac: &MacAddress,
        now: DateTime<Utc>,
    ) -> CoreResult<(Activation, Voucher)> {
        let _guard = self.lock()?;
        let bound_to_mac = self.snapshot(|v| v.bound_mac.as_ref() == Some(mac));
        self.modify(code, |v| lifecycle::activate(v, mac, now, &bound_to_mac))
    }

    async fn update_atomically<T, F>(&self, code: &VoucherCode, f: F) -> CoreResult<(T, Voucher)>
    where
        F: FnOnce(&mut Voucher) -> CoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let _guard = self.lock()?;
        self.modify(code, f)
    }

    async fn mark_authorized(&self, id: i64, mac: &MacAddress, at: DateTime<Utc>) -> CoreResult<bool> {
        Ok(self.modify_if_bound(id, mac, |v| v.authorized_at = Some(at)))
    }

    async fn clear_authorization(&self, id: i64, mac: &MacAddress) -> CoreResult<bool> {
        Ok(self.modify_if_bound(id, mac, |v| v.authorized_at = None))
    }

    async fn clear_binding(&self, id: i64, mac: &MacAddress) -> CoreResult<bool> {
        Ok(self.modify_if_bound(id, mac, |v| {
            lifecycle::reclaim(v);
        }))
    }

    async fn delete_all(&self) -> CoreResult<u64> {
        let _guard = self.lock()?;
        let removed = self.by_code.len();
        self.by_code.clear();
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }
}
