// ── Domain model ──
//
// Canonical voucher types shared by the store, lifecycle functions,
// reconciler and CLI. Identifiers are validated newtypes so a malformed
// MAC or code cannot reach the database or the gateway.

pub mod code;
pub mod mac;
pub mod price;
pub mod voucher;

pub use code::VoucherCode;
pub use mac::MacAddress;
pub use price::Price;
pub use voucher::{NewVoucher, Voucher, VoucherState};
