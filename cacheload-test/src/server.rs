//! Exposes an in-process cache server for use in integration tests.
//!
//! ```
//! use cacheload_test::server::TestServer;
//!
//! #[tokio::main]
//! async fn main() {
//!    let server = TestServer::new().await;
//!    let url = server.url("/health");
//!    // use the URL in tests...
//! }
//! ```

use std::collections::HashMap;
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex, MutexGuard};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

/// Longest key or value the server accepts, in characters.
pub const MAX_LENGTH: usize = 256;

/// A request as received by the [`TestServer`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RecordedRequest {
    /// `POST /put` with a JSON body.
    Put {
        /// The `key` field of the body.
        key: String,
        /// The `value` field of the body.
        value: String,
    },
    /// `GET /get` with a `key` query parameter.
    Get {
        /// The `key` query parameter.
        key: String,
    },
}

#[derive(Debug, Default)]
struct ServerState {
    cache: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ServerState {
    fn cache(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, request: RecordedRequest) {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
    }
}

#[derive(Deserialize)]
struct PutRequest {
    key: String,
    value: String,
}

#[derive(Deserialize)]
struct GetQuery {
    key: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    message: String,
}

#[derive(Serialize)]
struct GetResponse {
    status: &'static str,
    key: String,
    value: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    let body = StatusResponse {
        status: "ERROR",
        message: message.into(),
    };
    (status, Json(body)).into_response()
}

async fn put(
    State(state): State<Arc<ServerState>>,
    body: Result<Json<PutRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(PutRequest { key, value })) = body else {
        return error(StatusCode::BAD_REQUEST, "Invalid JSON format.");
    };
    state.record(RecordedRequest::Put {
        key: key.clone(),
        value: value.clone(),
    });

    let key = key.trim();
    if key.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Key cannot be empty.");
    }
    if key.chars().count() > MAX_LENGTH {
        return error(StatusCode::BAD_REQUEST, "Key exceeds maximum length.");
    }
    if value.chars().count() > MAX_LENGTH {
        return error(StatusCode::BAD_REQUEST, "Value exceeds maximum length.");
    }

    state.cache().insert(key.to_owned(), value);

    let body = StatusResponse {
        status: "OK",
        message: "Key inserted/updated successfully.".to_owned(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

async fn get_value(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<GetQuery>,
) -> Response {
    let Some(key) = query.key else {
        return error(StatusCode::BAD_REQUEST, "Missing 'key' query parameter.");
    };
    state.record(RecordedRequest::Get { key: key.clone() });

    let key = key.trim();
    if key.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Missing 'key' query parameter.");
    }
    if key.chars().count() > MAX_LENGTH {
        return error(StatusCode::BAD_REQUEST, "Key exceeds maximum length.");
    }

    let Some(value) = state.cache().get(key).cloned() else {
        return error(StatusCode::NOT_FOUND, "Key not found.");
    };

    let body = GetResponse {
        status: "OK",
        key: key.to_owned(),
        value,
    };
    (StatusCode::OK, Json(body)).into_response()
}

async fn health() -> impl IntoResponse {
    "OK"
}

/// An in-process cache server for use in integration tests.
///
/// The server keeps values in memory and records every `/put` and `/get` request it receives. It
/// listens on a random available port on `127.0.0.1` and stops when dropped.
#[derive(Debug)]
pub struct TestServer {
    handle: tokio::task::JoinHandle<()>,
    socket: SocketAddr,
    state: Arc<ServerState>,
}

impl TestServer {
    /// Starts a new server in the background.
    pub async fn new() -> Self {
        let addr = SocketAddr::from(([127, 0, 0, 1], 0));
        let listener = TcpListener::bind(addr).unwrap();
        listener.set_nonblocking(true).unwrap();
        let socket = listener.local_addr().unwrap();

        let state = Arc::new(ServerState::default());
        let app = Router::new()
            .route("/put", post(put))
            .route("/get", get(get_value))
            .route("/health", get(health))
            .with_state(Arc::clone(&state));

        let handle = tokio::spawn(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            handle,
            socket,
            state,
        }
    }

    /// Returns the base URL of the server, without a trailing slash.
    pub fn host(&self) -> String {
        format!("http://127.0.0.1:{}", self.socket.port())
    }

    /// Returns a full URL pointing to the given path.
    pub fn url(&self, path: &str) -> String {
        let path = path.trim_start_matches('/');
        format!("{}/{}", self.host(), path)
    }

    /// Returns all requests received so far, in order of arrival.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state
            .requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Returns the value currently stored for `key`.
    pub fn value(&self, key: &str) -> Option<String> {
        self.state.cache().get(key).cloned()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
