//! Mock JSON-RPC gateway for integration testing.
//!
//! Serves `POST /api/mcp-gateway/{server}/rpc` and picks its behaviour from
//! the request's `method`:
//!
//! - `slow`: sleeps before answering (timeout tests)
//! - `fail`: HTTP 500
//! - `garbage`: HTTP 200 with an HTML body
//! - `pretty`: HTTP 200 with a pretty-printed multi-line response
//! - notifications (no `id`): HTTP 202 with an empty body
//! - anything else: echoes `method` and `server` back in `result`

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    routing::post,
};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct MockState {
    request_count: RwLock<u32>,
    last_content_type: RwLock<Option<String>>,
    slow_delay: Duration,
}

pub struct MockGateway {
    slow_delay: Duration,
}

impl MockGateway {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slow_delay: Duration::from_secs(2),
        }
    }

    pub async fn start(self) -> (SocketAddr, MockGatewayHandle) {
        let state = Arc::new(MockState {
            slow_delay: self.slow_delay,
            ..MockState::default()
        });

        let app = Router::new()
            .route("/api/mcp-gateway/{server}/rpc", post(handle_rpc))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (
            addr,
            MockGatewayHandle {
                state,
                _handle: handle,
            },
        )
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MockGatewayHandle {
    state: Arc<MockState>,
    _handle: JoinHandle<()>,
}

impl MockGatewayHandle {
    pub async fn request_count(&self) -> u32 {
        *self.state.request_count.read().await
    }

    pub async fn last_content_type(&self) -> Option<String> {
        self.state.last_content_type.read().await.clone()
    }
}

async fn handle_rpc(
    State(state): State<Arc<MockState>>,
    Path(server): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, String) {
    *state.request_count.write().await += 1;
    *state.last_content_type.write().await = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let request: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return (StatusCode::BAD_REQUEST, "bad json".to_string()),
    };
    let method = request["method"].as_str().unwrap_or("").to_string();
    let Some(id) = request.get("id").cloned() else {
        return (StatusCode::ACCEPTED, String::new());
    };

    match method.as_str() {
        "slow" => {
            tokio::time::sleep(state.slow_delay).await;
            (
                StatusCode::OK,
                json!({"jsonrpc": "2.0", "id": id, "result": {}}).to_string(),
            )
        }
        "fail" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "upstream exploded: secret stack trace".to_string(),
        ),
        "garbage" => (StatusCode::OK, "<html>oops</html>".to_string()),
        "pretty" => (
            StatusCode::OK,
            serde_json::to_string_pretty(&json!({"jsonrpc": "2.0", "id": id, "result": {"ok": true}}))
                .unwrap(),
        ),
        _ => (
            StatusCode::OK,
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"method": method, "server": server}
            })
            .to_string(),
        ),
    }
}
