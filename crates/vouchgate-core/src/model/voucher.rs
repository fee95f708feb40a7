use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::{MacAddress, Price, VoucherCode};

/// Where a voucher sits in its lifecycle at a given instant.
///
/// Never stored: always derived from the timestamps and binding via
/// [`crate::lifecycle::state_at`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VoucherState {
    /// Issued, never activated.
    Unused,
    /// Activated, bound, and time remaining (developer vouchers stay here).
    Active,
    /// Past its expiry but the gateway grant has not been withdrawn yet.
    Expired,
    /// Activated, but the MAC binding has been cleared.
    Reclaimed,
}

/// A persisted voucher row.
///
/// `activated_at` and `expires_at` are set together or not at all;
/// `bound_mac` is only ever set on an activated voucher. `authorized_at`
/// records when the gateway grant for the current binding was confirmed and
/// is cleared whenever the binding changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: i64,
    pub code: VoucherCode,
    /// Access time granted on activation, in seconds.
    pub duration_secs: i64,
    pub price: Price,
    /// Name of the plan the voucher was issued under, if any.
    pub plan: Option<String>,
    pub is_developer: bool,
    pub created_at: DateTime<Utc>,
    pub activated_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub bound_mac: Option<MacAddress>,
    pub authorized_at: Option<DateTime<Utc>>,
}

impl Voucher {
    pub fn is_activated(&self) -> bool {
        self.activated_at.is_some()
    }
}

/// Input for issuing a voucher. The store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVoucher {
    pub code: VoucherCode,
    pub duration_secs: i64,
    pub price: Price,
    pub plan: Option<String>,
    pub is_developer: bool,
}
