// RouterOS REST client
//
// Wraps `reqwest::Client` with RouterOS URL construction, HTTP basic auth
// and error-envelope decoding. Endpoint families (hotspot, system) are
// implemented as inherent methods in separate files so this module stays
// focused on transport mechanics.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Error body returned by the REST API on any non-2xx status.
#[derive(Debug, serde::Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// Raw HTTP client for the RouterOS v7 REST API (`/rest/...`).
///
/// Every request carries basic-auth credentials; RouterOS has no session
/// concept on the REST surface.
pub struct RouterOsClient {
    http: reqwest::Client,
    base_url: Url,
    username: String,
    password: SecretString,
    timeout_secs: u64,
}

impl RouterOsClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// `base_url` is the router's web root, e.g. `https://192.168.88.1`.
    pub fn new(
        base_url: Url,
        username: impl Into<String>,
        password: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            username: username.into(),
            password,
            timeout_secs: transport.timeout_secs(),
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        base_url: Url,
        username: impl Into<String>,
        password: SecretString,
    ) -> Self {
        Self {
            http,
            base_url,
            username: username.into(),
            password,
            timeout_secs: 0,
        }
    }

    /// The router base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The account used for basic auth.
    pub fn username(&self) -> &str {
        &self.username
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/rest/{path}`.
    pub(crate) fn rest_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/rest/{path}"))?)
    }

    /// Build `{base}/rest/{path}?{key}={value}`.
    ///
    /// RouterOS treats plain query parameters as equality filters on the
    /// printed items.
    pub(crate) fn filtered_url(&self, path: &str, key: &str, value: &str) -> Result<Url, Error> {
        let mut url = self.rest_url(path)?;
        url.query_pairs_mut().append_pair(key, value);
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Send a GET request and decode the JSON body.
    pub(crate) async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);
        let resp = self.request(reqwest::Method::GET, url).send().await;
        self.decode(resp).await
    }

    /// Send a PUT request (RouterOS "add") and decode the created item.
    pub(crate) async fn put<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        debug!("PUT {}", url);
        let resp = self
            .request(reqwest::Method::PUT, url)
            .json(body)
            .send()
            .await;
        self.decode(resp).await
    }

    /// Send a PATCH request (RouterOS "set") and decode the updated item.
    pub(crate) async fn patch<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        debug!("PATCH {}", url);
        let resp = self
            .request(reqwest::Method::PATCH, url)
            .json(body)
            .send()
            .await;
        self.decode(resp).await
    }

    /// Send a POST request (RouterOS console command) and decode the reply.
    pub(crate) async fn post<T: DeserializeOwned>(
        &self,
        url: Url,
        body: &impl Serialize,
    ) -> Result<T, Error> {
        debug!("POST {}", url);
        let resp = self
            .request(reqwest::Method::POST, url)
            .json(body)
            .send()
            .await;
        self.decode(resp).await
    }

    /// Send a DELETE request. RouterOS answers with an empty body.
    pub(crate) async fn delete(&self, url: Url) -> Result<(), Error> {
        debug!("DELETE {}", url);
        let resp = self.request(reqwest::Method::DELETE, url).send().await;
        self.check_status(resp).await.map(drop)
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
    }

    /// Map transport failures and non-2xx statuses to typed errors.
    async fn check_status(
        &self,
        resp: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<reqwest::Response, Error> {
        let resp = resp.map_err(|e| {
            if e.is_timeout() && self.timeout_secs > 0 {
                Error::Timeout {
                    timeout_secs: self.timeout_secs,
                }
            } else {
                Error::Transport(e)
            }
        })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                message: format!("router rejected credentials for user '{}'", self.username),
            });
        }
        if status.is_success() {
            return Ok(resp);
        }

        let body = resp.text().await.unwrap_or_default();
        let envelope: Option<ErrorEnvelope> = serde_json::from_str(&body).ok();
        let (message, detail) = match envelope {
            Some(env) => (
                env.message
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_owned()),
                env.detail,
            ),
            None => (truncate(&body, 200), None),
        };
        Err(Error::RouterOs {
            status: status.as_u16(),
            message,
            detail,
        })
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        resp: Result<reqwest::Response, reqwest::Error>,
    ) -> Result<T, Error> {
        let resp = self.check_status(resp).await?;
        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: truncate(&body, 500),
        })
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}
