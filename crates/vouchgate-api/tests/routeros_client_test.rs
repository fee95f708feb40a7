// Integration tests for `RouterOsClient` using wiremock.
#![allow(clippy::unwrap_used)]

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use url::Url;
use wiremock::matchers::{basic_auth, body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vouchgate_api::{Error, NewHotspotUser, RouterOsClient, UserPatch};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, RouterOsClient) {
    let server = MockServer::start().await;
    let client = RouterOsClient::with_client(
        reqwest::Client::new(),
        Url::parse(&server.uri()).unwrap(),
        "vouchgate",
        SecretString::from("s3cret"),
    );
    (server, client)
}

// ── Happy-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_list_active_sends_basic_auth() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/ip/hotspot/active"))
        .and(basic_auth("vouchgate", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                ".id": "*A",
                "user": "AA:BB:CC:DD:EE:01",
                "address": "10.5.50.12",
                "mac-address": "AA:BB:CC:DD:EE:01",
                "uptime": "12m4s",
                "session-time-left": "47m56s",
                "bytes-in": "1048576",
                "bytes-out": "524288",
                "login-by": "mac"
            }
        ])))
        .mount(&server)
        .await;

    let sessions = client.list_active().await.unwrap();

    assert_eq!(sessions.len(), 1);
    let s = &sessions[0];
    assert_eq!(s.id, "*A");
    assert_eq!(s.mac_address.as_deref(), Some("AA:BB:CC:DD:EE:01"));
    assert_eq!(s.bytes_in(), 1_048_576);
    assert_eq!(s.bytes_out(), 524_288);
    assert_eq!(s.uptime_secs(), Some(724));
    assert_eq!(s.session_time_left_secs(), Some(2_876));
    assert_eq!(s.extra.get("login-by"), Some(&json!("mac")));
}

#[tokio::test]
async fn test_find_user_filters_by_name() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/ip/hotspot/user"))
        .and(query_param("name", "AA:BB:CC:DD:EE:01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                ".id": "*7",
                "name": "AA:BB:CC:DD:EE:01",
                "mac-address": "AA:BB:CC:DD:EE:01",
                "profile": "default",
                "limit-uptime": "1h",
                "disabled": "false"
            }
        ])))
        .mount(&server)
        .await;

    let user = client.find_user("AA:BB:CC:DD:EE:01").await.unwrap().unwrap();

    assert_eq!(user.id, "*7");
    assert_eq!(user.limit_uptime.as_deref(), Some("1h"));
    assert!(!user.is_disabled());
}

#[tokio::test]
async fn test_find_user_missing_returns_none() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/ip/hotspot/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert!(client.find_user("AA:BB:CC:DD:EE:02").await.unwrap().is_none());
}

#[tokio::test]
async fn test_add_user_puts_mac_login_body() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/rest/ip/hotspot/user"))
        .and(body_partial_json(json!({
            "name": "AA:BB:CC:DD:EE:01",
            "mac-address": "AA:BB:CC:DD:EE:01",
            "password": "",
            "limit-uptime": "1h"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            ".id": "*9",
            "name": "AA:BB:CC:DD:EE:01",
            "limit-uptime": "1h"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let created = client
        .add_user(&NewHotspotUser {
            name: "AA:BB:CC:DD:EE:01".into(),
            mac_address: "AA:BB:CC:DD:EE:01".into(),
            password: String::new(),
            profile: None,
            limit_uptime: "1h".into(),
            comment: Some("vouchgate".into()),
        })
        .await
        .unwrap();

    assert_eq!(created.id, "*9");
}

#[tokio::test]
async fn test_update_user_patches_by_id() {
    let (server, client) = setup().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/ip/hotspot/user/*9"))
        .and(body_partial_json(json!({ "profile": "throttled" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            ".id": "*9",
            "name": "AA:BB:CC:DD:EE:01",
            "profile": "throttled"
        })))
        .mount(&server)
        .await;

    let updated = client
        .update_user(
            "*9",
            &UserPatch {
                profile: Some("throttled".into()),
                ..UserPatch::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.profile.as_deref(), Some("throttled"));
}

#[tokio::test]
async fn test_remove_user_and_active_session() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/ip/hotspot/user/*9"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/ip/hotspot/active/remove"))
        .and(body_partial_json(json!({ ".id": "*A" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    client.remove_user("*9").await.unwrap();
    client.remove_active("*A").await.unwrap();
}

#[tokio::test]
async fn test_hosts_by_address() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/ip/hotspot/host"))
        .and(query_param("address", "10.5.50.12"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                ".id": "*3",
                "mac-address": "AA:BB:CC:DD:EE:03",
                "address": "10.5.50.12",
                "authorized": "false",
                "bypassed": "false"
            }
        ])))
        .mount(&server)
        .await;

    let hosts = client.hosts_by_address("10.5.50.12").await.unwrap();
    assert_eq!(hosts[0].mac_address.as_deref(), Some("AA:BB:CC:DD:EE:03"));
}

#[tokio::test]
async fn test_system_resource() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/system/resource"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "uptime": "3d4h",
            "version": "7.14.3 (stable)",
            "board-name": "hAP ax^2",
            "cpu-load": "7",
            "free-memory": "912345088",
            "total-memory": "1073741824"
        })))
        .mount(&server)
        .await;

    let res = client.system_resource().await.unwrap();

    assert_eq!(res.board_name.as_deref(), Some("hAP ax^2"));
    assert_eq!(res.cpu_load_percent(), Some(7));
    assert_eq!(res.total_memory_bytes(), Some(1_073_741_824));
    assert_eq!(res.uptime_secs(), Some(273_600));
}

// ── Error-path tests ────────────────────────────────────────────────

#[tokio::test]
async fn test_unauthorized_maps_to_authentication() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/system/resource"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.system_resource().await.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }), "got {err:?}");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn test_error_envelope_is_decoded() {
    let (server, client) = setup().await;

    Mock::given(method("DELETE"))
        .and(path("/rest/ip/hotspot/user/*404"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": 404,
            "message": "Not Found"
        })))
        .mount(&server)
        .await;

    let err = client.remove_user("*404").await.unwrap_err();
    assert!(err.is_not_found());
    match err {
        Error::RouterOs {
            status, message, ..
        } => {
            assert_eq!(status, 404);
            assert_eq!(message, "Not Found");
        }
        other => panic!("expected RouterOs error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bad_request_detail_is_kept() {
    let (server, client) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/rest/ip/hotspot/user"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": 400,
            "message": "Bad Request",
            "detail": "input does not match any value of profile"
        })))
        .mount(&server)
        .await;

    let err = client
        .add_user(&NewHotspotUser {
            name: "AA:BB:CC:DD:EE:01".into(),
            mac_address: "AA:BB:CC:DD:EE:01".into(),
            password: String::new(),
            profile: Some("missing".into()),
            limit_uptime: "1h".into(),
            comment: None,
        })
        .await
        .unwrap_err();

    assert_eq!(
        err.detail(),
        Some("input does not match any value of profile")
    );
    assert!(!err.is_transient());
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn test_server_error_is_transient() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/ip/hotspot/active"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let err = client.list_active().await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_malformed_body_is_deserialization_error() {
    let (server, client) = setup().await;

    Mock::given(method("GET"))
        .and(path("/rest/ip/hotspot/active"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let err = client.list_active().await.unwrap_err();
    assert!(
        matches!(err, Error::Deserialization { ref body, .. } if body.contains("login")),
        "got {err:?}"
    );
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    let client = RouterOsClient::with_client(
        reqwest::Client::new(),
        Url::parse("http://127.0.0.1:9").unwrap(),
        "vouchgate",
        SecretString::from("x"),
    );

    let err = client.list_active().await.unwrap_err();
    assert!(err.is_transient(), "got {err:?}");
}
