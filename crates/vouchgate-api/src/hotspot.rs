// Hotspot endpoints
//
// `/ip/hotspot/active`, `/ip/hotspot/user` and `/ip/hotspot/host`.
// Grants are modelled as MAC-login hotspot users; see `vouchgate-core`'s
// RouterOS gateway adapter for how these calls compose.

use serde_json::json;
use tracing::debug;

use crate::client::RouterOsClient;
use crate::error::Error;
use crate::models::{HotspotActive, HotspotHost, HotspotUser, NewHotspotUser, UserPatch};

impl RouterOsClient {
    // ── Active sessions ──────────────────────────────────────────────

    /// List every logged-in hotspot session.
    ///
    /// `GET /rest/ip/hotspot/active`
    pub async fn list_active(&self) -> Result<Vec<HotspotActive>, Error> {
        let url = self.rest_url("ip/hotspot/active")?;
        debug!("listing active hotspot sessions");
        self.get(url).await
    }

    /// Active sessions for one MAC (normally zero or one).
    ///
    /// `GET /rest/ip/hotspot/active?mac-address={mac}`
    pub async fn active_by_mac(&self, mac: &str) -> Result<Vec<HotspotActive>, Error> {
        let url = self.filtered_url("ip/hotspot/active", "mac-address", mac)?;
        self.get(url).await
    }

    /// Active sessions for one client IP.
    ///
    /// `GET /rest/ip/hotspot/active?address={ip}`
    pub async fn active_by_address(&self, address: &str) -> Result<Vec<HotspotActive>, Error> {
        let url = self.filtered_url("ip/hotspot/active", "address", address)?;
        self.get(url).await
    }

    /// Kick an active session.
    ///
    /// `POST /rest/ip/hotspot/active/remove` with `{".id": id}`
    pub async fn remove_active(&self, id: &str) -> Result<(), Error> {
        let url = self.rest_url("ip/hotspot/active/remove")?;
        debug!(id, "removing active hotspot session");
        let _: serde_json::Value = self.post(url, &json!({ ".id": id })).await?;
        Ok(())
    }

    // ── Users ────────────────────────────────────────────────────────

    /// Look up a hotspot user by exact name.
    ///
    /// `GET /rest/ip/hotspot/user?name={name}`
    pub async fn find_user(&self, name: &str) -> Result<Option<HotspotUser>, Error> {
        let url = self.filtered_url("ip/hotspot/user", "name", name)?;
        let users: Vec<HotspotUser> = self.get(url).await?;
        Ok(users.into_iter().find(|u| u.name == name))
    }

    /// Create a hotspot user.
    ///
    /// `PUT /rest/ip/hotspot/user`
    pub async fn add_user(&self, user: &NewHotspotUser) -> Result<HotspotUser, Error> {
        let url = self.rest_url("ip/hotspot/user")?;
        debug!(name = %user.name, limit_uptime = %user.limit_uptime, "adding hotspot user");
        self.put(url, user).await
    }

    /// Update selected properties of a hotspot user.
    ///
    /// `PATCH /rest/ip/hotspot/user/{id}`
    pub async fn update_user(&self, id: &str, patch: &UserPatch) -> Result<HotspotUser, Error> {
        let url = self.rest_url(&format!("ip/hotspot/user/{id}"))?;
        debug!(id, "updating hotspot user");
        self.patch(url, patch).await
    }

    /// Delete a hotspot user.
    ///
    /// `DELETE /rest/ip/hotspot/user/{id}`
    pub async fn remove_user(&self, id: &str) -> Result<(), Error> {
        let url = self.rest_url(&format!("ip/hotspot/user/{id}"))?;
        debug!(id, "removing hotspot user");
        self.delete(url).await
    }

    // ── Hosts ────────────────────────────────────────────────────────

    /// Hosts the hotspot has seen at the given IP.
    ///
    /// `GET /rest/ip/hotspot/host?address={ip}`
    pub async fn hosts_by_address(&self, address: &str) -> Result<Vec<HotspotHost>, Error> {
        let url = self.filtered_url("ip/hotspot/host", "address", address)?;
        self.get(url).await
    }
}
