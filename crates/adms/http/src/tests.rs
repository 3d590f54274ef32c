use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt as _;

use adms_notify::LogNotifier;
use adms_service::{Adms, Settings};
use adms_storage::SqliteStorage;

struct App {
    _dir: tempfile::TempDir,
    router: Router,
}

fn app() -> App {
    let dir = tempfile::tempdir().unwrap();
    let url = dir.path().join("http.db");
    let store = SqliteStorage::new(url.to_str().unwrap()).unwrap();
    store.run_migrations().unwrap();

    let service = Arc::new(Adms::new(store, LogNotifier, Settings::default()));
    let router = Router::new()
        .merge(crate::device_router(service.clone()))
        .merge(crate::api_router(service));

    App { _dir: dir, router }
}

impl App {
    async fn send(&self, method: Method, uri: &str, body: Body) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(body)
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    async fn text(&self, method: Method, uri: &str, body: &str) -> (StatusCode, String) {
        self.send(method, uri, Body::from(body.to_string())).await
    }

    async fn json(&self, method: Method, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn get_json(&self, uri: &str) -> Value {
        let (status, body) = self.send(Method::GET, uri, Body::empty()).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        serde_json::from_str(&body).unwrap()
    }

    /// Register ZK001, add a student and enroll them as PIN 1001.
    async fn provision(&self) {
        let (status, _) = self
            .json(
                Method::POST,
                "/api/devices",
                json!({"serial_number": "ZK001", "tenant_id": 9, "name": "Gate"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = self
            .json(
                Method::PUT,
                "/api/persons",
                json!({
                    "person": {"kind": "student", "id": 1},
                    "tenant_id": 9,
                    "name": "Ada",
                    "status": "active"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = self
            .json(
                Method::POST,
                "/api/devices/ZK001/enrollments",
                json!({"person": {"kind": "student", "id": 1}, "device_user_id": "1001"}),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }
}

#[tokio::test]
async fn test_handshake_requires_serial() {
    let app = app();
    let (status, body) = app.text(Method::GET, "/handshake?options=all", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "ERROR: missing SN");
}

#[tokio::test]
async fn test_handshake_rejects_unknown_device() {
    let app = app();
    let (status, body) = app.text(Method::GET, "/handshake?SN=NOPE", "").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "ERROR: unknown device NOPE");

    let (status, _) = app
        .text(Method::POST, "/punch-batch?SN=NOPE", "1\t2024-03-01 08:00:00\t0\t1")
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_handshake_reply() {
    let app = app();
    app.provision().await;

    let (status, body) = app
        .text(Method::GET, "/iclock/cdata?SN=ZK001&options=all&pushver=2.4.1", "")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("GET OPTION FROM: ZK001\n"));
    assert!(body.contains("\nTimeZone=0\n"));
    assert!(body.contains("\nServerTime="));

    let devices = app.get_json("/api/devices").await;
    assert_eq!(devices[0]["serial_number"], "ZK001");
    assert_eq!(devices[0]["online"], true);
}

#[tokio::test]
async fn test_punch_poll_ack_round() {
    let app = app();
    app.provision().await;

    let (status, body) = app.text(Method::GET, "/iclock/getrequest?SN=ZK001", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "C:1:DATA UPDATE USERINFO PIN=1001\tName=Ada\tPri=0");

    let (_, body) = app.text(Method::GET, "/poll?SN=ZK001", "").await;
    assert_eq!(body, "OK");

    let (status, body) = app
        .text(Method::POST, "/iclock/devicecmd?SN=ZK001", "ID=1&Return=0&CMD=DATA\n")
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));

    let commands = app.get_json("/api/devices/ZK001/commands").await;
    assert_eq!(commands[0]["status"], "executed");
    assert_eq!(commands[0]["return_value"], "0");

    let (status, body) = app
        .text(
            Method::POST,
            "/iclock/cdata?SN=ZK001&table=ATTLOG&Stamp=1",
            "1001\t2024-03-01 08:00:00\t0\t1\t0\t0\n1001\t2024-03-01 08:03:00\t1\t1\t0\t0\n",
        )
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));

    let sessions = app.get_json("/api/persons/student/1/sessions").await;
    assert_eq!(sessions.as_array().unwrap().len(), 1);
    assert_eq!(sessions[0]["checkout_method"], "biometric");

    let punches = app.get_json("/api/devices/ZK001/punches?limit=10").await;
    assert_eq!(punches.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unknown_ack_still_answers_ok() {
    let app = app();
    app.provision().await;

    let (status, body) = app
        .text(Method::POST, "/ack?SN=ZK001&ID=999&Return=0", "")
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));
}

#[tokio::test]
async fn test_other_tables_are_ignored() {
    let app = app();
    app.provision().await;

    let (status, body) = app
        .text(
            Method::POST,
            "/iclock/cdata?SN=ZK001&table=OPERLOG",
            "OPLOG 4\t0\t2024-03-01 08:00:00",
        )
        .await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));

    let punches = app.get_json("/api/devices/ZK001/punches").await;
    assert!(punches.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_errors() {
    let app = app();
    app.provision().await;

    let (status, body) = app
        .json(Method::POST, "/api/devices", json!({"serial_number": "ZK001"}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("ZK001"));

    let (status, _) = app
        .json(Method::POST, "/api/persons/student/1/checkout", json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.text(Method::GET, "/api/persons/parent/1/sessions", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .json(
            Method::POST,
            "/api/devices/ZK001/commands",
            json!({"type": "custom", "payload": "  "}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deactivated_device_is_refused() {
    let app = app();
    app.provision().await;

    let (status, body) = app
        .json(
            Method::PUT,
            "/api/devices/ZK001/status",
            json!({"status": "inactive"}),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "inactive");

    let (status, body) = app.text(Method::GET, "/poll?SN=ZK001", "").await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "ERROR: device ZK001 is inactive");
}

#[tokio::test]
async fn test_enqueue_reboot() {
    let app = app();
    app.provision().await;
    app.text(Method::GET, "/poll?SN=ZK001", "").await;

    let (status, body) = app
        .json(
            Method::POST,
            "/api/devices/ZK001/commands",
            json!({"type": "reboot"}),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["command_type"], "reboot");

    let (_, body) = app.text(Method::GET, "/poll?SN=ZK001", "").await;
    assert_eq!(body, "C:2:REBOOT");
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = app.text(Method::GET, "/health", "").await;
    assert_eq!((status, body.as_str()), (StatusCode::OK, "OK"));
}
