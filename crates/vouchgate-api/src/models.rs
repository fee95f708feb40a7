// RouterOS REST models
//
// RouterOS prints every property as a string (`"bytes-in": "12345"`,
// `"disabled": "false"`), so the structs keep the raw strings and expose
// typed accessors. Unknown properties land in `extra` rather than failing
// deserialization across firmware versions.

use serde::{Deserialize, Serialize};

// ── Hotspot ─────────────────────────────────────────────────────────

/// One entry of `/ip/hotspot/active`: a logged-in hotspot session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HotspotActive {
    #[serde(rename = ".id")]
    pub id: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub uptime: Option<String>,
    #[serde(default)]
    pub session_time_left: Option<String>,
    #[serde(default)]
    pub bytes_in: Option<String>,
    #[serde(default)]
    pub bytes_out: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl HotspotActive {
    /// Bytes received from the client, 0 when absent or unparseable.
    pub fn bytes_in(&self) -> u64 {
        parse_counter(self.bytes_in.as_deref())
    }

    /// Bytes sent to the client, 0 when absent or unparseable.
    pub fn bytes_out(&self) -> u64 {
        parse_counter(self.bytes_out.as_deref())
    }

    pub fn uptime_secs(&self) -> Option<u64> {
        self.uptime.as_deref().and_then(parse_routeros_duration)
    }

    pub fn session_time_left_secs(&self) -> Option<u64> {
        self.session_time_left
            .as_deref()
            .and_then(parse_routeros_duration)
    }
}

/// One entry of `/ip/hotspot/user`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HotspotUser {
    #[serde(rename = ".id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub limit_uptime: Option<String>,
    /// Uptime accumulated by this user; counted against `limit-uptime`.
    #[serde(default)]
    pub uptime: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub disabled: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl HotspotUser {
    pub fn is_disabled(&self) -> bool {
        self.disabled.as_deref() == Some("true")
    }

    pub fn uptime_secs(&self) -> u64 {
        self.uptime
            .as_deref()
            .and_then(parse_routeros_duration)
            .unwrap_or(0)
    }
}

/// Body for `PUT /rest/ip/hotspot/user`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct NewHotspotUser {
    pub name: String,
    pub mac_address: String,
    /// MAC-login users authenticate with an empty password.
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    pub limit_uptime: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Body for `PATCH /rest/ip/hotspot/user/{id}`. Unset fields are untouched.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_uptime: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disabled: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// One entry of `/ip/hotspot/host`: every device the hotspot has seen,
/// logged in or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HotspotHost {
    #[serde(rename = ".id")]
    pub id: String,
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub authorized: Option<String>,
    #[serde(default)]
    pub bypassed: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// ── System ──────────────────────────────────────────────────────────

/// `/system/resource` (the REST API returns a single object, not a list).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SystemResource {
    #[serde(default)]
    pub uptime: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub board_name: Option<String>,
    #[serde(default)]
    pub cpu_load: Option<String>,
    #[serde(default)]
    pub free_memory: Option<String>,
    #[serde(default)]
    pub total_memory: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl SystemResource {
    pub fn cpu_load_percent(&self) -> Option<u8> {
        self.cpu_load.as_deref()?.trim().parse().ok()
    }

    pub fn free_memory_bytes(&self) -> Option<u64> {
        self.free_memory.as_deref()?.trim().parse().ok()
    }

    pub fn total_memory_bytes(&self) -> Option<u64> {
        self.total_memory.as_deref()?.trim().parse().ok()
    }

    pub fn uptime_secs(&self) -> Option<u64> {
        self.uptime.as_deref().and_then(parse_routeros_duration)
    }
}

// ── Duration helpers ────────────────────────────────────────────────

fn parse_counter(raw: Option<&str>) -> u64 {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(0)
}

/// Parse a RouterOS time value into seconds.
///
/// Accepts the unit form RouterOS prints (`1w2d3h4m5s`, `59s`, `3h`) and
/// the clock form some older builds emit (`01:02:03`, `1d01:02:03`).
/// Fractional seconds (`1m2s350ms`) are truncated.
pub fn parse_routeros_duration(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.contains(':') {
        return parse_clock_form(raw);
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let value: u64 = digits.parse().ok()?;
        digits.clear();
        let unit = match c {
            'w' => 604_800,
            'd' => 86_400,
            'h' => 3_600,
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                0
            }
            'm' => 60,
            's' => 1,
            _ => return None,
        };
        total = total.checked_add(value.checked_mul(unit)?)?;
    }
    if !digits.is_empty() {
        // Bare number: RouterOS reads it as seconds.
        total = total.checked_add(digits.parse().ok()?)?;
    }
    Some(total)
}

fn parse_clock_form(raw: &str) -> Option<u64> {
    let (days, clock) = match raw.split_once('d') {
        Some((d, rest)) => (d.parse::<u64>().ok()?, rest),
        None => (0, raw),
    };
    let mut parts = clock.split(':');
    let h: u64 = parts.next()?.parse().ok()?;
    let m: u64 = parts.next()?.parse().ok()?;
    let s: u64 = parts.next()?.split('.').next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(days * 86_400 + h * 3_600 + m * 60 + s)
}

/// Format seconds the way RouterOS accepts them for `limit-uptime`.
pub fn format_routeros_duration(secs: u64) -> String {
    if secs == 0 {
        return "0s".to_owned();
    }
    let mut out = String::new();
    let mut rest = secs;
    for (unit, suffix) in [(86_400, 'd'), (3_600, 'h'), (60, 'm'), (1, 's')] {
        let n = rest / unit;
        if n > 0 {
            out.push_str(&n.to_string());
            out.push(suffix);
            rest %= unit;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unit_form() {
        assert_eq!(parse_routeros_duration("59s"), Some(59));
        assert_eq!(parse_routeros_duration("1h"), Some(3_600));
        assert_eq!(parse_routeros_duration("1w2d3h4m5s"), Some(788_645));
        assert_eq!(parse_routeros_duration("1m2s350ms"), Some(62));
    }

    #[test]
    fn parses_clock_form() {
        assert_eq!(parse_routeros_duration("01:02:03"), Some(3_723));
        assert_eq!(parse_routeros_duration("1d00:00:10"), Some(86_410));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_routeros_duration(""), None);
        assert_eq!(parse_routeros_duration("soon"), None);
        assert_eq!(parse_routeros_duration("1x"), None);
    }

    #[test]
    fn bare_number_is_seconds() {
        assert_eq!(parse_routeros_duration("90"), Some(90));
    }

    #[test]
    fn formats_compact_durations() {
        assert_eq!(format_routeros_duration(0), "0s");
        assert_eq!(format_routeros_duration(3_600), "1h");
        assert_eq!(format_routeros_duration(90_061), "1d1h1m1s");
    }

    #[test]
    fn counters_default_to_zero() {
        let active: HotspotActive = serde_json::from_value(serde_json::json!({
            ".id": "*1",
            "mac-address": "AA:BB:CC:DD:EE:FF",
            "bytes-in": "1024",
            "bytes-out": "oops"
        }))
        .unwrap_or_else(|e| panic!("decode failed: {e}"));
        assert_eq!(active.bytes_in(), 1024);
        assert_eq!(active.bytes_out(), 0);
        assert_eq!(active.session_time_left_secs(), None);
    }
}
