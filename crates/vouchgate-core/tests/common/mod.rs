// Shared fixtures for vouchgate-core integration tests.
#![allow(clippy::unwrap_used, dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};

use vouchgate_core::{
    ActiveSession, GatewayClient, GatewayError, GatewayHealth, MacAddress, ManualClock,
    MemoryVoucherStore, Plan, Reconciler, ReconcilerConfig,
};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
}

pub fn mac(s: &str) -> MacAddress {
    MacAddress::parse(s).unwrap()
}

pub fn one_hour_plan() -> Plan {
    Plan::new("1H", "1h", "10".parse().unwrap()).unwrap()
}

// ── Fake gateway ────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct FakeState {
    /// MAC → granted seconds.
    grants: HashMap<MacAddress, u64>,
    revoked: Vec<MacAddress>,
    profiles: HashMap<MacAddress, String>,
    sessions: Vec<ActiveSession>,
    ip_table: HashMap<IpAddr, MacAddress>,
    offline: bool,
    reject_profile_for: HashSet<MacAddress>,
    authorize_calls: usize,
    revoke_calls: usize,
}

/// In-memory gateway that records every call.
#[derive(Debug, Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    pub fn is_granted(&self, mac: &MacAddress) -> bool {
        self.state.lock().unwrap().grants.contains_key(mac)
    }

    pub fn granted_secs(&self, mac: &MacAddress) -> Option<u64> {
        self.state.lock().unwrap().grants.get(mac).copied()
    }

    pub fn revoked(&self) -> Vec<MacAddress> {
        self.state.lock().unwrap().revoked.clone()
    }

    pub fn authorize_calls(&self) -> usize {
        self.state.lock().unwrap().authorize_calls
    }

    pub fn revoke_calls(&self) -> usize {
        self.state.lock().unwrap().revoke_calls
    }

    pub fn profile_of(&self, mac: &MacAddress) -> Option<String> {
        self.state.lock().unwrap().profiles.get(mac).cloned()
    }

    pub fn set_sessions(&self, sessions: Vec<ActiveSession>) {
        self.state.lock().unwrap().sessions = sessions;
    }

    pub fn map_ip(&self, ip: IpAddr, mac: MacAddress) {
        self.state.lock().unwrap().ip_table.insert(ip, mac);
    }

    pub fn reject_profile_for(&self, mac: MacAddress) {
        self.state.lock().unwrap().reject_profile_for.insert(mac);
    }

    /// Pretend a grant already exists (e.g. left over from before a restart).
    pub fn seed_grant(&self, mac: MacAddress, secs: u64) {
        self.state.lock().unwrap().grants.insert(mac, secs);
    }
}

pub fn session(mac_str: &str, bytes_in: u64, bytes_out: u64) -> ActiveSession {
    ActiveSession {
        mac: mac(mac_str),
        user: Some(mac_str.to_owned()),
        address: None,
        uptime_secs: Some(60),
        bytes_in,
        bytes_out,
        time_left_secs: None,
    }
}

impl GatewayClient for FakeGateway {
    async fn authorize(&self, mac: &MacAddress, duration_secs: u64) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.authorize_calls += 1;
        if state.offline {
            return Err(GatewayError::Unavailable("router offline".into()));
        }
        state.grants.insert(mac.clone(), duration_secs);
        Ok(())
    }

    async fn revoke(&self, mac: &MacAddress) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.revoke_calls += 1;
        if state.offline {
            return Err(GatewayError::Unavailable("router offline".into()));
        }
        state.grants.remove(mac);
        state.profiles.remove(mac);
        state.revoked.push(mac.clone());
        Ok(())
    }

    async fn active_sessions(&self) -> Result<Vec<ActiveSession>, GatewayError> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(GatewayError::Unavailable("router offline".into()));
        }
        Ok(state.sessions.clone())
    }

    async fn lookup_mac_by_ip(&self, ip: IpAddr) -> Result<Option<MacAddress>, GatewayError> {
        let state = self.state.lock().unwrap();
        if state.offline {
            return Err(GatewayError::Unavailable("router offline".into()));
        }
        Ok(state.ip_table.get(&ip).cloned())
    }

    async fn set_service_profile(&self, mac: &MacAddress, profile: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        if state.offline {
            return Err(GatewayError::Unavailable("router offline".into()));
        }
        if state.reject_profile_for.contains(mac) {
            return Err(GatewayError::Rejected(format!("no hotspot user for {mac}")));
        }
        state.profiles.insert(mac.clone(), profile.to_owned());
        Ok(())
    }

    async fn health(&self) -> Result<GatewayHealth, GatewayError> {
        Ok(GatewayHealth {
            board_name: Some("fake".into()),
            ..GatewayHealth::default()
        })
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub store: Arc<MemoryVoucherStore>,
    pub gateway: Arc<FakeGateway>,
    pub clock: Arc<ManualClock>,
    pub reconciler: Reconciler<MemoryVoucherStore, FakeGateway>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ReconcilerConfig::default())
    }

    pub fn with_config(config: ReconcilerConfig) -> Self {
        let store = Arc::new(MemoryVoucherStore::new());
        let gateway = FakeGateway::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let reconciler = Reconciler::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            clock.clone(),
            config,
        );
        Self {
            store,
            gateway,
            clock,
            reconciler,
        }
    }
}
