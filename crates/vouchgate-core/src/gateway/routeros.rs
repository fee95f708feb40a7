// RouterOS gateway adapter
//
// A grant is a MAC-login hotspot user named after the MAC with
// `limit-uptime` set to the remaining voucher time. RouterOS logs the
// device in on its next request and drops it when the uptime runs out,
// so expiry is enforced even if vouchgate is down.

use std::net::IpAddr;

use tracing::{debug, warn};
use vouchgate_api::{
    HotspotActive, NewHotspotUser, RouterOsClient, TlsMode, TransportConfig, UserPatch,
    format_routeros_duration,
};

use super::{ActiveSession, GatewayClient, GatewayError, GatewayHealth};
use crate::config::{GatewayConfig, TlsVerification};
use crate::error::{CoreError, CoreResult};
use crate::model::MacAddress;

/// Comment stamped on hotspot users created by vouchgate.
const USER_COMMENT: &str = "vouchgate";

/// [`GatewayClient`] backed by the RouterOS REST API.
pub struct RouterOsGateway {
    client: RouterOsClient,
    default_profile: Option<String>,
}

impl RouterOsGateway {
    pub fn new(config: &GatewayConfig) -> CoreResult<Self> {
        let transport = TransportConfig {
            tls: tls_to_transport(&config.tls),
            timeout: config.timeout,
        };
        let client = RouterOsClient::new(
            config.url.clone(),
            config.username.clone(),
            config.password.clone(),
            &transport,
        )
        .map_err(|e| CoreError::Config {
            message: format!("gateway client: {e}"),
        })?;
        Ok(Self {
            client,
            default_profile: config.default_profile.clone(),
        })
    }
}

fn tls_to_transport(tls: &TlsVerification) -> TlsMode {
    match tls {
        TlsVerification::SystemDefaults => TlsMode::System,
        TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
        TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
    }
}

fn session_from_active(active: HotspotActive) -> Option<ActiveSession> {
    let raw_mac = active.mac_address.as_deref()?;
    let Ok(mac) = MacAddress::parse(raw_mac) else {
        debug!(id = %active.id, mac = raw_mac, "skipping session with unparseable MAC");
        return None;
    };
    Some(ActiveSession {
        mac,
        address: active.address.as_deref().and_then(|a| a.parse().ok()),
        uptime_secs: active.uptime_secs(),
        bytes_in: active.bytes_in(),
        bytes_out: active.bytes_out(),
        time_left_secs: active.session_time_left_secs(),
        user: active.user,
    })
}

impl GatewayClient for RouterOsGateway {
    async fn authorize(&self, mac: &MacAddress, duration_secs: u64) -> Result<(), GatewayError> {
        let name = mac.as_str();

        match self.client.find_user(name).await? {
            Some(user) => {
                // `limit-uptime` is measured against the user's total
                // uptime, so the grant goes on top of what was used.
                let used = user.uptime_secs();
                let patch = UserPatch {
                    limit_uptime: Some(format_routeros_duration(
                        used.saturating_add(duration_secs),
                    )),
                    profile: self.default_profile.clone(),
                    disabled: user.is_disabled().then(|| "false".to_owned()),
                    comment: None,
                };
                self.client.update_user(&user.id, &patch).await?;
            }
            None => {
                let user = NewHotspotUser {
                    name: name.to_owned(),
                    mac_address: name.to_owned(),
                    password: String::new(),
                    profile: self.default_profile.clone(),
                    limit_uptime: format_routeros_duration(duration_secs),
                    comment: Some(USER_COMMENT.to_owned()),
                };
                self.client.add_user(&user).await?;
            }
        }
        Ok(())
    }

    async fn revoke(&self, mac: &MacAddress) -> Result<(), GatewayError> {
        // Delete the user first so the device cannot log straight back in.
        if let Some(user) = self.client.find_user(mac.as_str()).await? {
            match self.client.remove_user(&user.id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!(%mac, "hotspot user already gone"),
                Err(e) => return Err(e.into()),
            }
        }

        for session in self.client.active_by_mac(mac.as_str()).await? {
            match self.client.remove_active(&session.id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => debug!(%mac, "session already closed"),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    async fn active_sessions(&self) -> Result<Vec<ActiveSession>, GatewayError> {
        let active = self.client.list_active().await?;
        Ok(active.into_iter().filter_map(session_from_active).collect())
    }

    async fn lookup_mac_by_ip(&self, ip: IpAddr) -> Result<Option<MacAddress>, GatewayError> {
        let address = ip.to_string();

        let from_active = self
            .client
            .active_by_address(&address)
            .await?
            .into_iter()
            .find_map(|a| a.mac_address.as_deref().and_then(|m| MacAddress::parse(m).ok()));
        if from_active.is_some() {
            return Ok(from_active);
        }

        let hosts = self.client.hosts_by_address(&address).await?;
        Ok(hosts
            .into_iter()
            .find_map(|h| h.mac_address.as_deref().and_then(|m| MacAddress::parse(m).ok())))
    }

    async fn set_service_profile(&self, mac: &MacAddress, profile: &str) -> Result<(), GatewayError> {
        let Some(user) = self.client.find_user(mac.as_str()).await? else {
            warn!(%mac, profile, "no hotspot user to re-profile");
            return Err(GatewayError::Rejected(format!("no hotspot user for {mac}")));
        };
        let patch = UserPatch {
            profile: Some(profile.to_owned()),
            ..UserPatch::default()
        };
        self.client.update_user(&user.id, &patch).await?;
        Ok(())
    }

    async fn health(&self) -> Result<GatewayHealth, GatewayError> {
        let res = self.client.system_resource().await?;
        Ok(GatewayHealth {
            cpu_load_percent: res.cpu_load_percent(),
            free_memory_bytes: res.free_memory_bytes(),
            total_memory_bytes: res.total_memory_bytes(),
            uptime_secs: res.uptime_secs(),
            board_name: res.board_name,
            version: res.version,
        })
    }
}
