//! In-process collaborators for integration tests: a mock tunnel broker, a
//! mock auth service, and a recording tunnel handler.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{Value, json};
use sha1::{Digest, Sha1};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tunnel_signal_sdk::TunnelHandler;

/// Reference signature implementation, independent of the SDK's
pub fn sign(payload: &str, secret: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(payload.as_bytes());
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// How the mock broker answers requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerMode {
    /// Well-formed success replies
    Ok,
    /// HTTP 500 with a plain-text body
    ServerError,
    /// HTTP 200 with a body that is not JSON
    InvalidJson,
    /// Well-formed reply with a non-zero result code
    Reject,
    /// Success reply whose data signature does not verify
    BadSignature,
    /// Well-formed success reply delayed past any reasonable client timeout
    Slow,
}

#[derive(Clone)]
struct BrokerState {
    secret: String,
    mode: BrokerMode,
    received: Arc<Mutex<Vec<(String, Value)>>>,
}

/// Mock tunnel broker on an ephemeral port, recording every envelope it
/// receives
pub struct MockBroker {
    pub url: String,
    received: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockBroker {
    pub async fn start(secret: &str, mode: BrokerMode) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let state = BrokerState {
            secret: secret.to_string(),
            mode,
            received: received.clone(),
        };

        let app = Router::new()
            .route("/get/wsurl", post(wsurl))
            .route("/ws/push", post(push))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock broker serves");
        });

        Self {
            url: format!("http://{}", addr),
            received,
        }
    }

    /// Envelopes received so far, as `(path, body)` pairs
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.received.lock().unwrap().clone()
    }
}

async fn wsurl(State(state): State<BrokerState>, Json(body): Json<Value>) -> (StatusCode, String) {
    state
        .received
        .lock()
        .unwrap()
        .push(("/get/wsurl".to_string(), body));

    if state.mode == BrokerMode::Slow {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    match state.mode {
        BrokerMode::ServerError => (StatusCode::INTERNAL_SERVER_ERROR, "broker down".to_string()),
        BrokerMode::InvalidJson => (StatusCode::OK, "<html>gateway error</html>".to_string()),
        BrokerMode::Reject => (
            StatusCode::OK,
            json!({ "code": 1001, "message": "quota exceeded" }).to_string(),
        ),
        BrokerMode::BadSignature => {
            let data =
                json!({ "tunnelId": "tunnel-1", "connectUrl": "wss://broker.test/ws/tunnel-1" })
                    .to_string();
            (
                StatusCode::OK,
                json!({ "code": 0, "message": "ok", "data": data, "signature": "bogus" })
                    .to_string(),
            )
        }
        BrokerMode::Ok | BrokerMode::Slow => {
            let data =
                json!({ "tunnelId": "tunnel-1", "connectUrl": "wss://broker.test/ws/tunnel-1" })
                    .to_string();
            let signature = sign(&data, &state.secret);
            (
                StatusCode::OK,
                json!({ "code": 0, "message": "ok", "data": data, "signature": signature })
                    .to_string(),
            )
        }
    }
}

async fn push(State(state): State<BrokerState>, Json(body): Json<Value>) -> (StatusCode, String) {
    state
        .received
        .lock()
        .unwrap()
        .push(("/ws/push".to_string(), body));

    if state.mode == BrokerMode::Slow {
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    match state.mode {
        BrokerMode::ServerError => (StatusCode::INTERNAL_SERVER_ERROR, "broker down".to_string()),
        BrokerMode::InvalidJson => (StatusCode::OK, "<html>gateway error</html>".to_string()),
        BrokerMode::Reject => (
            StatusCode::OK,
            json!({ "code": 2001, "message": "tunnel not found" }).to_string(),
        ),
        // Push acks carry no signature; BadSignature degenerates to Ok
        BrokerMode::Ok | BrokerMode::BadSignature | BrokerMode::Slow => (
            StatusCode::OK,
            json!({ "code": 0, "message": "ok" }).to_string(),
        ),
    }
}

/// How the mock auth service answers session checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Valid session with user info
    Ok,
    /// Session expired (code 1001)
    Expired,
    /// Internal failure (code 5000)
    Fail,
}

/// Mock login/session-check service on an ephemeral port
pub struct MockAuth {
    pub url: String,
}

impl MockAuth {
    pub async fn start(mode: AuthMode) -> Self {
        let app = Router::new()
            .route("/check", post(check))
            .route("/login", post(login))
            .with_state(mode);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind ephemeral port");
        let addr = listener.local_addr().expect("local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock auth serves");
        });

        Self {
            url: format!("http://{}", addr),
        }
    }
}

async fn check(State(mode): State<AuthMode>, Json(body): Json<Value>) -> Json<Value> {
    match mode {
        AuthMode::Ok => Json(json!({
            "code": 0,
            "message": "ok",
            "data": { "userInfo": { "nickname": "alice", "id": body["id"] } },
        })),
        AuthMode::Expired => Json(json!({ "code": 1001, "message": "session expired" })),
        AuthMode::Fail => Json(json!({ "code": 5000, "message": "auth backend down" })),
    }
}

async fn login(State(mode): State<AuthMode>, Json(_body): Json<Value>) -> Json<Value> {
    match mode {
        AuthMode::Ok => Json(json!({
            "code": 0,
            "message": "ok",
            "data": { "id": "s1", "key": "k1", "userInfo": { "nickname": "alice" } },
        })),
        AuthMode::Expired => Json(json!({ "code": 1001, "message": "session expired" })),
        AuthMode::Fail => Json(json!({ "code": 5000, "message": "auth backend down" })),
    }
}

/// One observed tunnel callback
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Request {
        tunnel_id: String,
        user_info: Option<Value>,
    },
    Connect(String),
    Message {
        tunnel_id: String,
        message_type: String,
        content: Option<String>,
    },
    Close(String),
}

/// Handler that forwards every callback into a channel for assertions
pub struct RecordingHandler {
    tx: UnboundedSender<Event>,
}

impl RecordingHandler {
    pub fn new() -> (Arc<Self>, UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

#[async_trait]
impl TunnelHandler for RecordingHandler {
    async fn on_request(&self, tunnel_id: &str, user_info: Option<Value>) -> anyhow::Result<()> {
        let _ = self.tx.send(Event::Request {
            tunnel_id: tunnel_id.to_string(),
            user_info,
        });
        Ok(())
    }

    async fn on_connect(&self, tunnel_id: &str) -> anyhow::Result<()> {
        let _ = self.tx.send(Event::Connect(tunnel_id.to_string()));
        Ok(())
    }

    async fn on_message(
        &self,
        tunnel_id: &str,
        message_type: &str,
        content: Option<String>,
    ) -> anyhow::Result<()> {
        let _ = self.tx.send(Event::Message {
            tunnel_id: tunnel_id.to_string(),
            message_type: message_type.to_string(),
            content,
        });
        Ok(())
    }

    async fn on_close(&self, tunnel_id: &str) -> anyhow::Result<()> {
        let _ = self.tx.send(Event::Close(tunnel_id.to_string()));
        Ok(())
    }
}
