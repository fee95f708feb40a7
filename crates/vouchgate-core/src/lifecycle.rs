// ── Voucher lifecycle ──
//
// Pure functions over a voucher and an explicit `now`. Nothing here reads
// the clock or touches I/O; the store wraps the mutating ones in a
// transaction and the reconciler acts on the predicates.
//
//   Unused ──activate──▶ Active ──now ≥ expires_at──▶ Expired ──revoke──▶ Reclaimed
//                          │                                                 ▲
//                          └────────────── operator revoke ─────────────────┘
//
// Developer vouchers never expire and may be reset to Unused via
// `end_session`.

use chrono::{DateTime, TimeDelta, Utc};

use crate::error::{CoreError, CoreResult};
use crate::model::{MacAddress, Voucher, VoucherState};

/// Remaining time reported for an active developer voucher.
pub const DEVELOPER_REMAINING_SECONDS: u64 = 999_999_999;

/// Outcome of a successful [`activate`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// The voucher was unused and is now bound to the MAC.
    Activated,
    /// The same MAC resubmitted a code it already holds with time left.
    AlreadyActiveForMac,
}

/// Derive the voucher's state at `now`.
pub fn state_at(voucher: &Voucher, now: DateTime<Utc>) -> VoucherState {
    let (Some(_), Some(expires_at)) = (voucher.activated_at, voucher.expires_at) else {
        return VoucherState::Unused;
    };
    if voucher.bound_mac.is_none() {
        VoucherState::Reclaimed
    } else if voucher.is_developer || now < expires_at {
        VoucherState::Active
    } else {
        VoucherState::Expired
    }
}

/// Seconds of access left at `now`.
///
/// Zero for unused and reclaimed vouchers, the developer sentinel for an
/// active developer voucher, otherwise `max(0, expires_at - now)`.
pub fn remaining_seconds(voucher: &Voucher, now: DateTime<Utc>) -> u64 {
    match state_at(voucher, now) {
        VoucherState::Unused | VoucherState::Reclaimed | VoucherState::Expired => 0,
        VoucherState::Active if voucher.is_developer => DEVELOPER_REMAINING_SECONDS,
        // Round up so an active voucher never reports zero.
        VoucherState::Active => voucher
            .expires_at
            .map(|exp| (exp - now).num_milliseconds())
            .and_then(|ms| u64::try_from(ms).ok())
            .map_or(0, |ms| ms.div_ceil(1000)),
    }
}

/// Bind an unused voucher to `mac`, starting its clock at `now`.
///
/// `bound_to_mac` holds the other vouchers currently bound to the same MAC;
/// a MAC may hold at most one active non-developer voucher. Resubmitting a
/// code from the MAC that already holds it (with time left) succeeds without
/// changing anything.
pub fn activate(
    voucher: &mut Voucher,
    mac: &MacAddress,
    now: DateTime<Utc>,
    bound_to_mac: &[Voucher],
) -> CoreResult<Activation> {
    if voucher.is_activated() {
        if voucher.bound_mac.as_ref() == Some(mac) && remaining_seconds(voucher, now) > 0 {
            return Ok(Activation::AlreadyActiveForMac);
        }
        return Err(CoreError::AlreadyActivated {
            code: voucher.code.to_string(),
        });
    }

    if !voucher.is_developer {
        let holder = bound_to_mac.iter().find(|other| {
            other.id != voucher.id
                && !other.is_developer
                && state_at(other, now) == VoucherState::Active
        });
        if let Some(holder) = holder {
            return Err(CoreError::NotPermitted {
                reason: format!("{mac} already has an active voucher ({})", holder.code),
            });
        }
    }

    let expires_at = TimeDelta::try_seconds(voucher.duration_secs)
        .and_then(|d| now.checked_add_signed(d))
        .ok_or_else(|| {
            CoreError::validation(format!(
                "voucher duration out of range: {}s",
                voucher.duration_secs
            ))
        })?;

    voucher.activated_at = Some(now);
    voucher.expires_at = Some(expires_at);
    voucher.bound_mac = Some(mac.clone());
    voucher.authorized_at = None;
    Ok(Activation::Activated)
}

/// Reset a developer voucher to unused, returning the MAC it was bound to.
pub fn end_session(voucher: &mut Voucher) -> CoreResult<Option<MacAddress>> {
    if !voucher.is_developer {
        return Err(CoreError::NotPermitted {
            reason: format!("{} is not a developer voucher", voucher.code),
        });
    }
    let previous = voucher.bound_mac.take();
    voucher.activated_at = None;
    voucher.expires_at = None;
    voucher.authorized_at = None;
    Ok(previous)
}

/// Clear the binding after the gateway grant was withdrawn.
pub fn reclaim(voucher: &mut Voucher) -> Option<MacAddress> {
    voucher.authorized_at = None;
    voucher.bound_mac.take()
}

/// Whether the gateway grant for this voucher must be withdrawn at `now`.
pub fn needs_revocation(voucher: &Voucher, now: DateTime<Utc>) -> bool {
    !voucher.is_developer && state_at(voucher, now) == VoucherState::Expired
}

/// Whether the binding is active but the gateway grant is not yet confirmed.
pub fn needs_authorization(voucher: &Voucher, now: DateTime<Utc>) -> bool {
    voucher.authorized_at.is_none() && state_at(voucher, now) == VoucherState::Active
}
