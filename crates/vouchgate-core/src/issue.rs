// ── Voucher issuance ──
//
// Plans, validity parsing, and collision-safe code generation. Codes use
// an alphabet without look-alike characters because they are read off
// paper slips and typed on phones.

use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{CoreError, CoreResult};
use crate::lifecycle::DEVELOPER_REMAINING_SECONDS;
use crate::model::code::{MAX_CODE_LEN, MIN_CODE_LEN};
use crate::model::{NewVoucher, Price, Voucher, VoucherCode};
use crate::store::VoucherStore;

/// A–Z and 2–9 without I, O, Q, 0 and 1.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPRSTUVWXYZ23456789";
pub const DEFAULT_CODE_LENGTH: usize = 6;
const MAX_COLLISION_RETRIES: usize = 10;

/// A sellable voucher type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub name: String,
    pub duration_secs: i64,
    pub price: Price,
}

impl Plan {
    pub fn new(name: impl Into<String>, validity: &str, price: Price) -> CoreResult<Self> {
        Ok(Self {
            name: name.into(),
            duration_secs: parse_validity(validity)?,
            price,
        })
    }
}

/// Parse a validity such as `1h`, `30m`, `1d` or `2h 30m` into seconds.
///
/// A bare number is minutes, matching how operators price short passes.
pub fn parse_validity(raw: &str) -> CoreResult<i64> {
    let raw = raw.trim();
    let secs = if raw.chars().all(|c| c.is_ascii_digit()) && !raw.is_empty() {
        raw.parse::<i64>()
            .ok()
            .and_then(|minutes| minutes.checked_mul(60))
    } else {
        humantime::parse_duration(raw)
            .ok()
            .and_then(|d| i64::try_from(d.as_secs()).ok())
    };
    match secs {
        Some(secs) if secs > 0 => Ok(secs),
        _ => Err(CoreError::validation(format!("invalid validity: {raw:?}"))),
    }
}

/// Draw a random code of `len` characters from [`CODE_ALPHABET`].
pub fn generate_code<R: Rng + ?Sized>(rng: &mut R, len: usize) -> CoreResult<VoucherCode> {
    let code: String = (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..CODE_ALPHABET.len());
            char::from(CODE_ALPHABET.get(idx).copied().unwrap_or(b'A'))
        })
        .collect();
    VoucherCode::parse(&code)
}

/// Issues vouchers into a store.
pub struct Issuer<S> {
    store: Arc<S>,
    code_length: usize,
}

impl<S: VoucherStore> Issuer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            code_length: DEFAULT_CODE_LENGTH,
        }
    }

    pub fn with_code_length(mut self, len: usize) -> CoreResult<Self> {
        if !(MIN_CODE_LEN..=MAX_CODE_LEN).contains(&len) {
            return Err(CoreError::validation(format!(
                "code length must be between {MIN_CODE_LEN} and {MAX_CODE_LEN}"
            )));
        }
        self.code_length = len;
        Ok(self)
    }

    /// Issue one voucher under `plan`, retrying on code collisions.
    pub async fn issue_one(&self, plan: &Plan) -> CoreResult<Voucher> {
        for _ in 0..MAX_COLLISION_RETRIES {
            let code = generate_code(&mut rand::thread_rng(), self.code_length)?;
            let new = NewVoucher {
                code,
                duration_secs: plan.duration_secs,
                price: plan.price,
                plan: Some(plan.name.clone()),
                is_developer: false,
            };
            match self.store.insert(new).await {
                Ok(voucher) => return Ok(voucher),
                Err(CoreError::DuplicateCode { code }) => {
                    debug!(%code, "code collision; drawing another");
                }
                Err(e) => return Err(e),
            }
        }
        Err(CoreError::Internal(format!(
            "no free {}-character code after {MAX_COLLISION_RETRIES} attempts",
            self.code_length
        )))
    }

    /// Issue `count` vouchers under `plan`.
    pub async fn issue_batch(&self, plan: &Plan, count: usize) -> CoreResult<Vec<Voucher>> {
        let mut issued = Vec::with_capacity(count);
        for _ in 0..count {
            issued.push(self.issue_one(plan).await?);
        }
        info!(plan = %plan.name, count, "vouchers issued");
        Ok(issued)
    }

    /// Create a reusable developer voucher with a chosen code.
    pub async fn create_developer(&self, code: &str) -> CoreResult<Voucher> {
        let new = NewVoucher {
            code: VoucherCode::parse(code)?,
            duration_secs: i64::try_from(DEVELOPER_REMAINING_SECONDS).unwrap_or(i64::MAX),
            price: Price::ZERO,
            plan: Some("developer".to_owned()),
            is_developer: true,
        };
        let voucher = self.store.insert(new).await?;
        info!(code = %voucher.code, "developer voucher created");
        Ok(voucher)
    }
}
