use std::time::{Duration, Instant};

use ecrypto_protocol::{
    EngineEndpoint, EngineError, EngineOperation, EngineResult, Envelope, HttpMethod,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::requests::{
    CheckPasswordRequest, DecryptRequest, EncryptRequest, InfoRequest, KeygenRequest,
    SuggestPathRequest,
};

const HEALTH_ROUTE: &str = "/health";
const MAX_ERROR_EXCERPT_CHARS: usize = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GatewayConfig {
    /// Whole-request deadline. `None` leaves timing to the transport.
    pub request_timeout: Option<Duration>,
    pub connect_timeout: Option<Duration>,
}

/// Stateless request/response bridge to the engine's HTTP API.
///
/// Every public call resolves to an [`Envelope`]; nothing is propagated as an error.
#[derive(Debug, Clone)]
pub struct EngineGateway {
    endpoint: EngineEndpoint,
    client: reqwest::Client,
}

impl EngineGateway {
    pub fn new(endpoint: EngineEndpoint) -> Self {
        Self::with_config(endpoint, GatewayConfig::default())
    }

    pub fn with_config(endpoint: EngineEndpoint, config: GatewayConfig) -> Self {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().unwrap_or_else(|error| {
            tracing::warn!(
                error = %error,
                "failed to build configured HTTP client; using defaults"
            );
            reqwest::Client::new()
        });
        Self { endpoint, client }
    }

    pub fn endpoint(&self) -> &EngineEndpoint {
        &self.endpoint
    }

    /// Forwards `payload` unchanged to the route of `operation`.
    pub async fn call(&self, operation: EngineOperation, payload: Value) -> Envelope {
        if !operation.is_request_response() {
            return Envelope::failure(format!(
                "'{}' is a streaming operation and cannot be called as a request",
                operation.name()
            ));
        }
        Envelope::from_result(self.exchange(operation, payload).await)
    }

    /// Runs [`EngineGateway::call`] as its own task so the caller can cancel it.
    pub fn spawn_call(&self, operation: EngineOperation, payload: Value) -> PendingCall {
        let gateway = self.clone();
        let task = tokio::spawn(async move { gateway.call(operation, payload).await });
        PendingCall { operation, task }
    }

    pub async fn encrypt(&self, request: &EncryptRequest) -> Envelope {
        self.call_typed(EngineOperation::Encrypt, request).await
    }

    pub async fn decrypt(&self, request: &DecryptRequest) -> Envelope {
        self.call_typed(EngineOperation::Decrypt, request).await
    }

    pub async fn keygen(&self, request: &KeygenRequest) -> Envelope {
        self.call_typed(EngineOperation::Keygen, request).await
    }

    pub async fn info(&self, request: &InfoRequest) -> Envelope {
        self.call_typed(EngineOperation::Info, request).await
    }

    pub async fn suggest_path(&self, path: &str) -> Envelope {
        let request = SuggestPathRequest {
            path: path.to_owned(),
        };
        self.call_typed(EngineOperation::SuggestPath, &request).await
    }

    pub async fn check_password(&self, password: &str) -> Envelope {
        let request = CheckPasswordRequest {
            password: password.to_owned(),
        };
        self.call_typed(EngineOperation::CheckPassword, &request).await
    }

    pub async fn health(&self) -> Envelope {
        Envelope::from_result(
            self.send(HttpMethod::Get, HEALTH_ROUTE, Value::Null, "health").await,
        )
    }

    pub(crate) async fn call_typed<T>(&self, operation: EngineOperation, request: &T) -> Envelope
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_value(request) {
            Ok(payload) => self.call(operation, payload).await,
            Err(error) => Envelope::from_error(&EngineError::Protocol(format!(
                "failed to encode {} request: {error}",
                operation.name()
            ))),
        }
    }

    pub(crate) async fn exchange(
        &self,
        operation: EngineOperation,
        payload: Value,
    ) -> EngineResult<Value> {
        self.send(operation.method(), operation.route(), payload, operation.name()).await
    }

    async fn send(
        &self,
        method: HttpMethod,
        route: &str,
        payload: Value,
        label: &str,
    ) -> EngineResult<Value> {
        let url = self.endpoint.url(route);
        let request = match method {
            HttpMethod::Get => self.client.get(url.as_str()),
            HttpMethod::Post => {
                let body = if payload.is_null() { json!({}) } else { payload };
                self.client.post(url.as_str()).json(&body)
            }
        };

        let started = Instant::now();
        let response = request.send().await.map_err(|error| {
            tracing::debug!(operation = label, error = %error, "engine request failed");
            EngineError::Transport(format!(
                "engine unreachable: {}",
                describe_transport_error(&error)
            ))
        })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|error| {
            EngineError::Transport(format!(
                "failed to read engine {label} response: {}",
                describe_transport_error(&error)
            ))
        })?;
        tracing::debug!(
            operation = label,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "engine call completed"
        );

        interpret_response(status, body.as_str())
    }
}

/// Maps a raw engine response onto the success value or the most useful error.
///
/// A non-empty `error` string in the body wins over the generic status text so
/// the UI can show the engine's own wording.
pub fn interpret_response(status: u16, body: &str) -> EngineResult<Value> {
    let trimmed = body.trim();
    if (200..300).contains(&status) {
        if trimmed.is_empty() {
            return Ok(Value::Null);
        }
        let value: Value = serde_json::from_str(trimmed).map_err(|error| {
            EngineError::Protocol(format!(
                "malformed engine response: {error}; body: {}",
                sanitize_error_body(trimmed)
            ))
        })?;
        if value.get("success") == Some(&Value::Bool(false)) {
            let message = application_error_message(trimmed)
                .unwrap_or_else(|| "engine reported failure without an error message".to_owned());
            return Err(EngineError::Application { status, message });
        }
        return Ok(value);
    }

    if let Some(message) = application_error_message(trimmed) {
        return Err(EngineError::Application { status, message });
    }

    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map(|reason| format!(" {reason}"))
        .unwrap_or_default();
    let excerpt = sanitize_error_body(trimmed);
    if excerpt.is_empty() {
        Err(EngineError::Transport(format!(
            "engine responded with status {status}{reason}"
        )))
    } else {
        Err(EngineError::Transport(format!(
            "engine responded with status {status}{reason}: {excerpt}"
        )))
    }
}

fn application_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    let message = match error {
        Value::String(message) => message.trim().to_owned(),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(|message| message.trim().to_owned())
            .unwrap_or_default(),
        _ => String::new(),
    };
    (!message.is_empty()).then_some(message)
}

pub(crate) fn describe_transport_error(error: &reqwest::Error) -> String {
    let mut description = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !description.contains(cause_text.as_str()) {
            description.push_str(": ");
            description.push_str(cause_text.as_str());
        }
        source = cause.source();
    }
    description
}

pub(crate) fn sanitize_error_body(body: &str) -> String {
    let sanitized = body
        .chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if sanitized.chars().count() > MAX_ERROR_EXCERPT_CHARS {
        let truncated = sanitized
            .chars()
            .take(MAX_ERROR_EXCERPT_CHARS)
            .collect::<String>();
        format!("{truncated}...")
    } else {
        sanitized
    }
}

/// A gateway call running on its own task.
///
/// Cancelling drops the local HTTP exchange; the engine may still finish the
/// work it was asked to do.
#[derive(Debug)]
pub struct PendingCall {
    operation: EngineOperation,
    task: JoinHandle<Envelope>,
}

impl PendingCall {
    pub fn operation(&self) -> EngineOperation {
        self.operation
    }

    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn outcome(self) -> Envelope {
        match self.task.await {
            Ok(envelope) => envelope,
            Err(error) if error.is_cancelled() => Envelope::from_error(&EngineError::Cancelled),
            Err(error) => Envelope::failure(format!(
                "{} call aborted unexpectedly: {error}",
                self.operation.name()
            )),
        }
    }
}
