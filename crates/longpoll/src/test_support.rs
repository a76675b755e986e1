//! In-process stand-in for the VK API and its long-poll server.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::{HashMap, VecDeque},
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::get,
    },
    serde_json::{Value, json},
    tokio::{sync::oneshot, task::JoinHandle},
};

use vkbridge_config::PollingConfig;

use crate::{
    acquire::{LongPollServer, PollScope, SessionAcquirer, VkApiAcquirer},
    error::AcquireError,
    transport::PollOptions,
};

/// Scripted answer to a `*.getLongPollServer` call.
#[derive(Debug, Clone)]
pub(crate) enum AcquireReply {
    Ok { ts: Value },
    ApiError { code: i64, msg: String },
    Status(u16),
}

impl AcquireReply {
    pub(crate) fn ok(ts: u64) -> Self {
        Self::Ok { ts: json!(ts) }
    }

    pub(crate) fn api_error(code: i64, msg: &str) -> Self {
        Self::ApiError {
            code,
            msg: msg.into(),
        }
    }
}

/// Scripted answer to a poll request.
#[derive(Debug, Clone)]
pub(crate) enum PollReply {
    Json(Value),
    Status(u16),
    Raw(&'static str),
    /// Hold the request open, then answer with an empty batch.
    Hang(Duration),
}

#[derive(Debug, Clone)]
pub(crate) struct AcquireCall {
    pub method: String,
    pub query: HashMap<String, String>,
}

#[derive(Default)]
struct Inner {
    addr: Option<SocketAddr>,
    acquire_script: VecDeque<AcquireReply>,
    poll_script: VecDeque<PollReply>,
    acquire_calls: Vec<AcquireCall>,
    poll_calls: Vec<HashMap<String, String>>,
    keys_issued: u32,
}

#[derive(Clone, Default)]
struct MockState {
    inner: Arc<Mutex<Inner>>,
}

pub(crate) struct MockVk {
    addr: SocketAddr,
    state: MockState,
    shutdown: Option<oneshot::Sender<()>>,
    server: Option<JoinHandle<()>>,
}

impl MockVk {
    pub(crate) async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/method/{name}", get(api_handler))
            .route("/poll", get(poll_handler))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock vk listener");
        let addr = listener.local_addr().expect("local addr");
        state.inner.lock().unwrap().addr = Some(addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("serve mock vk");
        });

        Self {
            addr,
            state,
            shutdown: Some(shutdown_tx),
            server: Some(server),
        }
    }

    pub(crate) fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub(crate) fn poll_url(&self) -> String {
        format!("http://{}/poll", self.addr)
    }

    pub(crate) fn push_acquire(&self, reply: AcquireReply) {
        self.state
            .inner
            .lock()
            .unwrap()
            .acquire_script
            .push_back(reply);
    }

    pub(crate) fn push_poll(&self, reply: PollReply) {
        self.state.inner.lock().unwrap().poll_script.push_back(reply);
    }

    pub(crate) fn push_poll_json(&self, body: Value) {
        self.push_poll(PollReply::Json(body));
    }

    pub(crate) fn acquire_calls(&self) -> Vec<AcquireCall> {
        self.state.inner.lock().unwrap().acquire_calls.clone()
    }

    pub(crate) fn poll_calls(&self) -> Vec<HashMap<String, String>> {
        self.state.inner.lock().unwrap().poll_calls.clone()
    }

    /// Cheap handle for reading the poll count from inside a handler.
    pub(crate) fn poll_counter(&self) -> PollCounter {
        PollCounter {
            state: self.state.clone(),
        }
    }

    /// `VkApiAcquirer` pointed at this mock.
    pub(crate) fn acquirer(&self) -> VkApiAcquirer {
        let config = vkbridge_config::VkAccountConfig {
            token: secrecy::Secret::new("test-token".into()),
            api_url: self.base_url(),
            ..Default::default()
        };
        VkApiAcquirer::new(&config).expect("mock acquirer")
    }

    pub(crate) async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(server) = self.server.take() {
            server.abort();
            let _ = server.await;
        }
    }
}

#[derive(Clone)]
pub(crate) struct PollCounter {
    state: MockState,
}

impl PollCounter {
    pub(crate) fn count(&self) -> usize {
        self.state.inner.lock().unwrap().poll_calls.len()
    }
}

impl Drop for MockVk {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

async fn api_handler(
    State(state): State<MockState>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let reply = {
        let mut inner = state.inner.lock().unwrap();
        inner.acquire_calls.push(AcquireCall {
            method: name,
            query,
        });
        inner
            .acquire_script
            .pop_front()
            .unwrap_or(AcquireReply::ok(100))
    };

    match reply {
        AcquireReply::Ok { ts } => {
            let (addr, key) = {
                let mut inner = state.inner.lock().unwrap();
                inner.keys_issued += 1;
                (inner.addr.expect("mock addr"), format!("key-{}", inner.keys_issued))
            };
            Json(json!({
                "response": {
                    "server": format!("http://{addr}/poll"),
                    "key": key,
                    "ts": ts,
                }
            }))
            .into_response()
        },
        AcquireReply::ApiError { code, msg } => Json(json!({
            "error": { "error_code": code, "error_msg": msg }
        }))
        .into_response(),
        AcquireReply::Status(code) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
    }
}

async fn poll_handler(
    State(state): State<MockState>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let ts = query.get("ts").cloned().unwrap_or_default();
    let reply = {
        let mut inner = state.inner.lock().unwrap();
        inner.poll_calls.push(query);
        inner.poll_script.pop_front()
    };

    match reply {
        Some(PollReply::Json(body)) => Json(body).into_response(),
        Some(PollReply::Status(code)) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            .into_response(),
        Some(PollReply::Raw(body)) => (StatusCode::OK, body).into_response(),
        Some(PollReply::Hang(delay)) => {
            tokio::time::sleep(delay).await;
            Json(json!({"ts": ts, "updates": []})).into_response()
        },
        None => {
            // Idle long poll: nothing new, same cursor.
            tokio::time::sleep(Duration::from_millis(20)).await;
            Json(json!({"ts": ts, "updates": []})).into_response()
        },
    }
}

/// Acquirer that always fails, for start-time error paths.
pub(crate) struct FailingAcquirer;

#[async_trait::async_trait]
impl SessionAcquirer for FailingAcquirer {
    async fn acquire(&self, _scope: PollScope) -> Result<LongPollServer, AcquireError> {
        Err(AcquireError::Api {
            code: 5,
            message: "User authorization failed".into(),
        })
    }
}

/// Options with millisecond-scale delays.
pub(crate) fn fast_options() -> PollOptions {
    PollOptions {
        retry_backoff: Duration::from_millis(10),
        reacquire_wait: Duration::from_millis(10),
        request_timeout: Duration::from_secs(5),
        ..PollOptions::from(&PollingConfig::default())
    }
}

/// Poll `condition` until it holds, panicking after five seconds.
pub(crate) async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
