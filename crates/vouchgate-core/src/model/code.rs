use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Shortest code accepted at the portal.
pub const MIN_CODE_LEN: usize = 4;
/// Longest code accepted at the portal.
pub const MAX_CODE_LEN: usize = 16;

/// A voucher code: trimmed, upper-cased, `[A-Z0-9]{4,16}`.
///
/// Users type codes off printed slips, so lookups are case-insensitive by
/// normalizing on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoucherCode(String);

impl VoucherCode {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let code = raw.trim().to_ascii_uppercase();
        let len_ok = (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&code.len());
        if !len_ok || !code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
            return Err(CoreError::validation(format!(
                "voucher code must be {MIN_CODE_LEN}-{MAX_CODE_LEN} letters or digits, got {raw:?}"
            )));
        }
        Ok(Self(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoucherCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for VoucherCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VoucherCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VoucherCode> for String {
    fn from(code: VoucherCode) -> Self {
        code.0
    }
}
