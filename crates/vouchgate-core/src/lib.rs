//! Voucher lifecycle and gateway access reconciliation.
//!
//! This crate owns the domain model and the background machinery that keeps
//! a MikroTik hotspot in step with the voucher database:
//!
//! - **[`lifecycle`]**: Pure functions over a [`Voucher`] and an explicit
//!   `now`: state derivation, remaining time, activation, developer session
//!   reset, and the predicates the reconciler acts on.
//!
//! - **[`VoucherStore`]**: Durable persistence with atomic
//!   read-modify-write per voucher. [`SqliteVoucherStore`] is the production
//!   backend; [`MemoryVoucherStore`] backs tests and `serve --ephemeral`.
//!
//! - **[`GatewayClient`]**: The network-access boundary (authorize, revoke,
//!   sessions, IP lookup, profile changes). [`RouterOsGateway`] speaks the
//!   RouterOS REST API through `vouchgate-api`.
//!
//! - **[`Reconciler`]**: A single background task that revokes expired
//!   grants, retries pending authorizations, and applies the fair-use policy.
//!   Handlers never call the gateway themselves; they commit to the store and
//!   nudge the reconciler through a [`ReconcilerHandle`].
//!
//! - **[`Portal`]**: The operations a captive-portal front end needs:
//!   activate, remaining time, lookup, developer end-session.
//!
//! - **[`issue`]**: Code generation, plans, and batch issuance.

pub mod clock;
pub mod config;
pub mod error;
pub mod gateway;
pub mod issue;
pub mod lifecycle;
pub mod lookup;
pub mod model;
pub mod portal;
pub mod reconciler;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{FupPolicy, GatewayConfig, ReconcilerConfig, TlsVerification};
pub use error::{CoreError, CoreResult};
pub use gateway::{
    ActiveSession, GatewayClient, GatewayError, GatewayHealth, RouterOsGateway,
};
pub use issue::{Issuer, Plan};
pub use lifecycle::{Activation, DEVELOPER_REMAINING_SECONDS};
pub use lookup::SessionLookup;
pub use model::{MacAddress, NewVoucher, Price, Voucher, VoucherCode, VoucherState};
pub use portal::{ActivationReceipt, Portal, VoucherStatus};
pub use reconciler::{
    Reconciler, ReconcilerHandle, RunningReconciler, SweepReport, UsageReport,
};
pub use store::{
    ListFilter, MemoryVoucherStore, SqliteVoucherStore, StatusCounts, VoucherStore,
};
