//! End-to-end protocol tests: a real router on a loopback listener,
//! driven over HTTP the way a peer would.

use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use lanbeam_core::DaemonConfig;
use lanbeam_daemon::routes::build_router;
use lanbeam_daemon::sender::{collect_file, Sender};
use lanbeam_daemon::state::AppState;
use lanbeam_proto::{DeviceInfo, DeviceType, PeerEndpoint, Protocol, PROTOCOL_VERSION};

struct TestDaemon {
    base: String,
    addr: SocketAddr,
    state: Arc<AppState>,
    _dir: tempfile::TempDir,
}

async fn spawn_daemon(mutate: impl FnOnce(&mut DaemonConfig)) -> TestDaemon {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DaemonConfig::default();
    config.alias = "R".to_string();
    config.upload_root = dir.path().join("uploads");
    mutate(&mut config);
    config.finalize().unwrap();

    let state = AppState::new(config).unwrap();
    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestDaemon {
        base: format!("http://{addr}"),
        addr,
        state,
        _dir: dir,
    }
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn prepare_body(file_id: &str, name: &str, size: u64, sha256: Option<String>) -> Value {
    json!({
        "info": {
            "alias": "S",
            "version": "2.0",
            "deviceType": "mobile",
            "fingerprint": "sender-fp"
        },
        "files": {
            file_id: {
                "id": file_id,
                "fileName": name,
                "size": size,
                "fileType": "text/plain",
                "sha256": sha256
            }
        }
    })
}

async fn prepare(
    client: &reqwest::Client,
    daemon: &TestDaemon,
    body: &Value,
    pin: Option<&str>,
) -> reqwest::Response {
    let mut url = format!("{}/api/localsend/v2/prepare-upload", daemon.base);
    if let Some(pin) = pin {
        url = format!("{url}?pin={pin}");
    }
    client.post(url).json(body).send().await.unwrap()
}

async fn upload(
    client: &reqwest::Client,
    daemon: &TestDaemon,
    session_id: &str,
    file_id: &str,
    token: &str,
    body: &'static [u8],
) -> reqwest::Response {
    client
        .post(format!(
            "{}/api/localsend/v2/upload?sessionId={session_id}&fileId={file_id}&token={token}",
            daemon.base
        ))
        .body(body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn single_file_happy_path() {
    let daemon = spawn_daemon(|_| {}).await;
    let client = reqwest::Client::new();

    let body = prepare_body("f1", "a.txt", 5, Some(hex_sha256(b"hello")));
    let response = prepare(&client, &daemon, &body, None).await;
    assert_eq!(response.status(), 200);
    let accepted: Value = response.json().await.unwrap();
    let session_id = accepted["sessionId"].as_str().unwrap().to_string();
    assert!(!session_id.is_empty());
    let token = accepted["files"]["f1"].as_str().unwrap().to_string();
    assert!(!token.is_empty());

    let response = upload(&client, &daemon, &session_id, "f1", &token, b"hello").await;
    assert_eq!(response.status(), 200);

    let path = daemon
        .state
        .config
        .upload_root
        .join(&session_id)
        .join("f1_a.txt");
    assert_eq!(std::fs::read(&path).unwrap(), b"hello");
}

#[tokio::test]
async fn corrupted_body_yields_hash_mismatch() {
    let daemon = spawn_daemon(|_| {}).await;
    let client = reqwest::Client::new();

    let body = prepare_body("f1", "a.txt", 5, Some(hex_sha256(b"hello")));
    let accepted: Value = prepare(&client, &daemon, &body, None)
        .await
        .json()
        .await
        .unwrap();
    let session_id = accepted["sessionId"].as_str().unwrap();
    let token = accepted["files"]["f1"].as_str().unwrap();

    let response = upload(&client, &daemon, session_id, "f1", token, b"hellO").await;
    assert_eq!(response.status(), 500);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "hash mismatch");
}

#[tokio::test]
async fn wrong_length_yields_size_mismatch() {
    let daemon = spawn_daemon(|_| {}).await;
    let client = reqwest::Client::new();

    let body = prepare_body("f1", "a.txt", 3, None);
    let accepted: Value = prepare(&client, &daemon, &body, None)
        .await
        .json()
        .await
        .unwrap();
    let session_id = accepted["sessionId"].as_str().unwrap();
    let token = accepted["files"]["f1"].as_str().unwrap();

    let response = upload(&client, &daemon, session_id, "f1", token, b"hello").await;
    assert_eq!(response.status(), 500);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "size mismatch");
}

#[tokio::test]
async fn wrong_token_is_forbidden() {
    let daemon = spawn_daemon(|_| {}).await;
    let client = reqwest::Client::new();

    let body = prepare_body("f1", "a.txt", 5, None);
    let accepted: Value = prepare(&client, &daemon, &body, None)
        .await
        .json()
        .await
        .unwrap();
    let session_id = accepted["sessionId"].as_str().unwrap();

    let response = upload(&client, &daemon, session_id, "f1", "deadbeef", b"hello").await;
    assert_eq!(response.status(), 403);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "Invalid token or IP address");
}

#[tokio::test]
async fn cancel_is_idempotent_and_blocks_later_uploads() {
    let daemon = spawn_daemon(|_| {}).await;
    let client = reqwest::Client::new();

    let body = prepare_body("f1", "a.txt", 5, None);
    let accepted: Value = prepare(&client, &daemon, &body, None)
        .await
        .json()
        .await
        .unwrap();
    let session_id = accepted["sessionId"].as_str().unwrap().to_string();
    let token = accepted["files"]["f1"].as_str().unwrap().to_string();

    let cancel_url = format!(
        "{}/api/localsend/v2/cancel?sessionId={session_id}",
        daemon.base
    );
    assert_eq!(client.post(&cancel_url).send().await.unwrap().status(), 200);
    // Cancel of an already-gone session is still 200.
    assert_eq!(client.post(&cancel_url).send().await.unwrap().status(), 200);
    let unknown = format!(
        "{}/api/localsend/v2/cancel?sessionId=never-existed",
        daemon.base
    );
    assert_eq!(client.post(&unknown).send().await.unwrap().status(), 200);

    let response = upload(&client, &daemon, &session_id, "f1", &token, b"hello").await;
    assert_eq!(response.status(), 409);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "Blocked by another session");
}

#[tokio::test]
async fn pin_is_required_then_accepted() {
    let daemon = spawn_daemon(|config| {
        config.pin = Some("1234".to_string());
    })
    .await;
    let client = reqwest::Client::new();
    let body = prepare_body("f1", "a.txt", 5, None);

    let response = prepare(&client, &daemon, &body, None).await;
    assert_eq!(response.status(), 401);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "PIN required");

    let response = prepare(&client, &daemon, &body, Some("9999")).await;
    assert_eq!(response.status(), 401);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "Invalid PIN");

    let response = prepare(&client, &daemon, &body, Some("1234")).await;
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn response_tokens_mirror_the_request_files() {
    let daemon = spawn_daemon(|_| {}).await;
    let client = reqwest::Client::new();

    let body = json!({
        "info": {
            "alias": "S",
            "version": "2.0",
            "deviceType": "mobile",
            "fingerprint": "sender-fp"
        },
        "files": {
            "f1": {"id": "f1", "fileName": "a.txt", "size": 1, "fileType": "text/plain"},
            "f2": {"id": "f2", "fileName": "b.txt", "size": 2, "fileType": "text/plain"},
            "f3": {"id": "f3", "fileName": "c.txt", "size": 3, "fileType": "text/plain"}
        }
    });
    let accepted: Value = prepare(&client, &daemon, &body, None)
        .await
        .json()
        .await
        .unwrap();
    let files = accepted["files"].as_object().unwrap();
    assert_eq!(files.len(), 3);
    let mut tokens: Vec<&str> = files.values().map(|v| v.as_str().unwrap()).collect();
    assert!(tokens.iter().all(|t| !t.is_empty()));
    tokens.sort();
    tokens.dedup();
    assert_eq!(tokens.len(), 3);
}

#[tokio::test]
async fn expired_session_is_conflict() {
    let daemon = spawn_daemon(|config| {
        config.session_ttl_secs = 1;
    })
    .await;
    let client = reqwest::Client::new();

    let body = prepare_body("f1", "a.txt", 5, None);
    let accepted: Value = prepare(&client, &daemon, &body, None)
        .await
        .json()
        .await
        .unwrap();
    let session_id = accepted["sessionId"].as_str().unwrap().to_string();
    let token = accepted["files"]["f1"].as_str().unwrap().to_string();

    tokio::time::sleep(std::time::Duration::from_millis(1300)).await;

    let response = upload(&client, &daemon, &session_id, "f1", &token, b"hello").await;
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn malformed_bodies_and_missing_params_are_400() {
    let daemon = spawn_daemon(|_| {}).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/api/localsend/v2/prepare-upload", daemon.base))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "Invalid request body");

    let response = client
        .post(format!("{}/api/localsend/v2/register", daemon.base))
        .body("{\"alias\":")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .post(format!(
            "{}/api/localsend/v2/upload?sessionId=s",
            daemon.base
        ))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "Missing parameters");

    let response = client
        .post(format!("{}/api/localsend/v2/cancel", daemon.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn wrong_method_and_unknown_path() {
    let daemon = spawn_daemon(|_| {}).await;
    let client = reqwest::Client::new();

    let response = client
        .get(format!("{}/api/localsend/v2/register", daemon.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);

    let response = client
        .post(format!("{}/api/localsend/v2/nope", daemon.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn register_records_peers_but_drops_self() {
    let daemon = spawn_daemon(|_| {}).await;
    let client = reqwest::Client::new();

    // Our own fingerprint bounced back at us must not appear in the registry.
    let own = json!({
        "alias": "R",
        "version": PROTOCOL_VERSION,
        "deviceType": "headless",
        "fingerprint": daemon.state.config.fingerprint,
        "port": 53317,
        "protocol": "http"
    });
    let response = client
        .post(format!("{}/api/localsend/v2/register", daemon.base))
        .json(&own)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(daemon.state.registry.len(), 0);

    let peer = json!({
        "alias": "Phone",
        "version": PROTOCOL_VERSION,
        "deviceType": "mobile",
        "fingerprint": "phone-fp",
        "port": 53317,
        "protocol": "http"
    });
    let response = client
        .post(format!("{}/api/localsend/v2/register", daemon.base))
        .json(&peer)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let status: Value = response.json().await.unwrap();
    assert_eq!(status["status"], "ok");

    let devices: Value = client
        .get(format!("{}/api/lanbeam/v1/devices", daemon.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let list = devices["devices"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["info"]["fingerprint"], "phone-fp");
    assert!(list[0]["lastSeen"].is_string());
}

#[tokio::test]
async fn concurrent_session_is_blocked() {
    let daemon = spawn_daemon(|_| {}).await;
    let client = reqwest::Client::new();

    let first = prepare_body("f1", "a.txt", 5, None);
    assert_eq!(prepare(&client, &daemon, &first, None).await.status(), 200);

    let mut second = prepare_body("f1", "b.txt", 5, None);
    second["info"]["fingerprint"] = json!("other-fp");
    let response = prepare(&client, &daemon, &second, None).await;
    assert_eq!(response.status(), 409);
    let error: Value = response.json().await.unwrap();
    assert_eq!(error["error"], "blocked by another session");
}

#[tokio::test]
async fn sender_engine_round_trips_through_receiver() {
    let daemon = spawn_daemon(|_| {}).await;

    let mut tmp = tempfile::NamedTempFile::new().unwrap();
    tmp.write_all(b"hello from the sender").unwrap();
    tmp.flush().unwrap();
    let outgoing = collect_file(tmp.path(), Some("text/plain")).await.unwrap();
    let file_id = outgoing.info.id.clone();
    let file_name = outgoing.info.file_name.clone();

    let sender = Sender::new(
        DeviceInfo {
            alias: "S".to_string(),
            version: PROTOCOL_VERSION.to_string(),
            device_model: None,
            device_type: DeviceType::Desktop,
            fingerprint: "sender-fp".to_string(),
            port: 53317,
            protocol: Protocol::Http,
            download: false,
        },
        std::time::Duration::from_secs(30),
    )
    .unwrap();

    let peer = PeerEndpoint::new(Ipv4Addr::LOCALHOST, daemon.addr.port(), Protocol::Http);
    let report = sender.send_files(&peer, vec![outgoing], None).await.unwrap();

    let session_id = report.session_id.unwrap();
    assert_eq!(report.files_sent, vec![file_id.clone()]);

    let path = daemon
        .state
        .config
        .upload_root
        .join(&session_id)
        .join(format!("{file_id}_{file_name}"));
    assert_eq!(std::fs::read(&path).unwrap(), b"hello from the sender");
}

#[tokio::test]
async fn scan_endpoint_acknowledges() {
    let daemon = spawn_daemon(|_| {}).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/lanbeam/v1/scan", daemon.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn send_to_unknown_target_is_404() {
    let daemon = spawn_daemon(|_| {}).await;
    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/lanbeam/v1/send", daemon.base))
        .json(&json!({"target": "nobody", "files": [{"path": "/tmp/x"}]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
