#![allow(dead_code)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use ecrypto_protocol::EngineEndpoint;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);
pub const WRONG_PASSWORD: &str = "wrong";
pub const SLOW_KEY_PATH: &str = "/keys/slow.key";

/// What `GET /progress` answers with.
#[derive(Debug, Clone)]
pub enum ProgressScript {
    /// Each entry becomes one `data:` frame.
    Frames(Vec<String>),
    Status(StatusCode, String),
    /// Sends the frames, then breaks the connection.
    BrokenAfter(Vec<String>),
}

impl Default for ProgressScript {
    fn default() -> Self {
        Self::Frames(vec![r#"{"status": "connected"}"#.to_owned()])
    }
}

#[derive(Clone, Default)]
pub struct MockState {
    pub ledger: Arc<Mutex<Vec<Value>>>,
    pub files: Arc<Mutex<HashSet<String>>>,
    pub requests: Arc<Mutex<Vec<(String, Value)>>>,
    pub progress: Arc<Mutex<ProgressScript>>,
    /// Undoing an already-undone operation succeeds instead of failing.
    idempotent_undo: Arc<AtomicBool>,
    undone: Arc<Mutex<HashSet<String>>>,
    next_id: Arc<AtomicU64>,
}

impl MockState {
    fn record(&self, route: &str, payload: &Value) {
        self.requests
            .lock()
            .expect("requests lock")
            .push((route.to_owned(), payload.clone()));
    }

    fn add_operation(&self, kind: &str, payload: &Value, success: bool) -> String {
        let id = format!("op-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let method = if payload["useKey"].as_bool().unwrap_or(false) {
            "keyfile"
        } else {
            "passphrase"
        };
        self.ledger.lock().expect("ledger lock").push(json!({
            "id": id,
            "type": kind,
            "input_path": payload["inputPath"],
            "output_path": payload["outputPath"],
            "method": method,
            "timestamp": "2024-05-01T10:00:00Z",
            "success": success,
        }));
        id
    }

    pub fn requests_to(&self, route: &str) -> Vec<Value> {
        self.requests
            .lock()
            .expect("requests lock")
            .iter()
            .filter(|(recorded, _)| recorded == route)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    pub fn remove_file(&self, path: &str) {
        self.files.lock().expect("files lock").remove(path);
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.lock().expect("files lock").contains(path)
    }

    pub fn set_progress(&self, script: ProgressScript) {
        *self.progress.lock().expect("progress lock") = script;
    }

    pub fn set_idempotent_undo(&self, enabled: bool) {
        self.idempotent_undo.store(enabled, Ordering::SeqCst);
    }
}

fn engine_success(message: &str, data: Value) -> Response {
    Json(json!({"success": true, "message": message, "data": data})).into_response()
}

fn engine_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"success": false, "error": message}))).into_response()
}

async fn encrypt(State(state): State<MockState>, Json(payload): Json<Value>) -> Response {
    state.record("/encrypt", &payload);
    let input = payload["inputPath"].as_str().unwrap_or_default();
    let output = payload["outputPath"].as_str().unwrap_or_default();
    if input.is_empty() || output.is_empty() {
        return engine_error(StatusCode::BAD_REQUEST, "inputPath and outputPath are required");
    }
    if payload["password"].as_str() == Some(WRONG_PASSWORD) {
        state.add_operation("encrypt", &payload, false);
        return engine_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Encryption failed: weak passphrase rejected",
        );
    }
    state.add_operation("encrypt", &payload, true);
    state.files.lock().expect("files lock").insert(output.to_owned());
    engine_success(
        "Encryption completed successfully",
        json!({"outputPath": output}),
    )
}

async fn decrypt(State(state): State<MockState>, Json(payload): Json<Value>) -> Response {
    state.record("/decrypt", &payload);
    if payload["password"].as_str() == Some(WRONG_PASSWORD) {
        state.add_operation("decrypt", &payload, false);
        return engine_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Decryption failed: authentication failed",
        );
    }
    state.add_operation("decrypt", &payload, true);
    engine_success(
        "Decryption completed successfully",
        json!({"outputPath": payload["outputPath"]}),
    )
}

async fn keygen(State(state): State<MockState>, Json(payload): Json<Value>) -> Response {
    state.record("/keygen", &payload);
    if payload["outputPath"].as_str() == Some(SLOW_KEY_PATH) {
        tokio::time::sleep(Duration::from_secs(10)).await;
    }
    engine_success(
        "Key generated successfully",
        json!({"key": "00ff", "savedTo": payload["outputPath"]}),
    )
}

async fn info(State(state): State<MockState>, Json(payload): Json<Value>) -> Response {
    state.record("/info", &payload);
    match payload["filePath"].as_str().unwrap_or_default() {
        "plain-error" => (StatusCode::BAD_GATEWAY, "upstream\nexploded").into_response(),
        "malformed" => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/html")],
            "<html>oops</html>",
        )
            .into_response(),
        "empty-error" => engine_error(StatusCode::INTERNAL_SERVER_ERROR, ""),
        "" => engine_error(StatusCode::BAD_REQUEST, "filePath is required"),
        path => engine_success(
            "Container info retrieved",
            json!({"filePath": path, "version": 1, "cipher": "XChaCha20-Poly1305"}),
        ),
    }
}

async fn history(State(state): State<MockState>) -> Response {
    let operations = state.ledger.lock().expect("ledger lock").clone();
    engine_success(
        "History retrieved successfully",
        json!({"operations": operations, "max_size": 100}),
    )
}

async fn undo(State(state): State<MockState>, Json(payload): Json<Value>) -> Response {
    state.record("/undo", &payload);
    let operation_id = payload["operationId"].as_str().unwrap_or_default();
    let operation = state
        .ledger
        .lock()
        .expect("ledger lock")
        .iter()
        .find(|entry| entry["id"] == operation_id)
        .cloned();
    let Some(operation) = operation else {
        let repeated = state
            .undone
            .lock()
            .expect("undone lock")
            .contains(operation_id);
        if repeated && state.idempotent_undo.load(Ordering::SeqCst) {
            return engine_success(
                "Operation already undone",
                json!({"operationId": operation_id}),
            );
        }
        return engine_error(StatusCode::NOT_FOUND, "Operation not found");
    };
    if operation["type"] != "encrypt" {
        return engine_error(
            StatusCode::BAD_REQUEST,
            "Only encryption operations can be undone",
        );
    }
    let output = operation["output_path"].as_str().unwrap_or_default().to_owned();
    if !state.files.lock().expect("files lock").remove(&output) {
        return engine_error(StatusCode::NOT_FOUND, "Encrypted file no longer exists");
    }
    state
        .ledger
        .lock()
        .expect("ledger lock")
        .retain(|entry| entry["id"] != operation_id);
    state
        .undone
        .lock()
        .expect("undone lock")
        .insert(operation_id.to_owned());
    engine_success(
        "Operation undone successfully - encrypted file deleted",
        json!({"deletedFile": output}),
    )
}

async fn suggest_path(State(state): State<MockState>, Json(payload): Json<Value>) -> Response {
    state.record("/suggest-path", &payload);
    let path = payload["path"].as_str().unwrap_or_default();
    engine_success(
        "Suggestions generated",
        json!({"encrypt": format!("{path}.ecrypt"), "decrypt": path.trim_end_matches(".ecrypt")}),
    )
}

async fn check_password(State(state): State<MockState>, Json(payload): Json<Value>) -> Response {
    state.record("/check-password", &payload);
    let length = payload["password"].as_str().unwrap_or_default().len();
    engine_success(
        "Password strength checked",
        json!({"score": length.min(4), "acceptable": length >= 8}),
    )
}

async fn health() -> Response {
    engine_success("Server is healthy", json!({"status": "ok"}))
}

fn sse_body(frames: &[String]) -> String {
    frames
        .iter()
        .map(|frame| format!("data: {frame}\n\n"))
        .collect::<String>()
}

async fn progress(State(state): State<MockState>) -> Response {
    let script = state.progress.lock().expect("progress lock").clone();
    match script {
        ProgressScript::Frames(frames) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/event-stream")],
            sse_body(&frames),
        )
            .into_response(),
        ProgressScript::Status(status, body) => (status, body).into_response(),
        ProgressScript::BrokenAfter(frames) => {
            let chunks: Vec<Result<String, std::io::Error>> = vec![
                Ok(sse_body(&frames)),
                Err(std::io::Error::other("engine crashed mid-stream")),
            ];
            let stream = futures_util::stream::iter(chunks);
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/event-stream")],
                Body::from_stream(stream),
            )
                .into_response()
        }
    }
}

pub struct MockEngine {
    pub base_url: String,
    pub state: MockState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl MockEngine {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/encrypt", post(encrypt))
            .route("/decrypt", post(decrypt))
            .route("/keygen", post(keygen))
            .route("/info", post(info))
            .route("/history", get(history))
            .route("/undo", post(undo))
            .route("/suggest-path", post(suggest_path))
            .route("/check-password", post(check_password))
            .route("/progress", get(progress))
            .route("/health", get(health))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock engine listener");
        let address: SocketAddr = listener.local_addr().expect("mock engine local addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            server.await.expect("run mock engine");
        });

        Self {
            base_url: format!("http://{address}"),
            state,
            shutdown_tx: Some(shutdown_tx),
            handle,
        }
    }

    pub fn endpoint(&self) -> EngineEndpoint {
        EngineEndpoint::new(self.base_url.clone())
    }

    pub async fn shutdown(mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        let _ = tokio::time::timeout(TEST_TIMEOUT, &mut self.handle).await;
    }
}

/// An endpoint nothing listens on.
pub async fn refused_endpoint() -> EngineEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind throwaway listener");
    let address = listener.local_addr().expect("throwaway local addr");
    drop(listener);
    EngineEndpoint::new(format!("http://{address}"))
}
