// vouchgate-api: Async Rust client for the MikroTik RouterOS v7 REST API
//
// Covers the slice of RouterOS the voucher gateway needs: hotspot users
// (MAC-login grants), active hotspot sessions, hotspot hosts (IP to MAC
// resolution), and system resource health.

pub mod client;
pub mod error;
pub mod hotspot;
pub mod models;
pub mod system;
pub mod transport;

pub use client::RouterOsClient;
pub use error::Error;
pub use models::{
    HotspotActive, HotspotHost, HotspotUser, NewHotspotUser, SystemResource, UserPatch,
    format_routeros_duration, parse_routeros_duration,
};
pub use transport::{TlsMode, TransportConfig};
