use std::sync::Arc;

use ecrypto_gateway::{EngineGateway, GatewayConfig, HistoryProxy, ProgressRelay};
use ecrypto_protocol::{
    Capability, EngineEndpoint, EngineOperation, Envelope, ProgressNotification, SelectionIntent,
};
use ecrypto_supervisor::EngineSupervisor;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::selection::{PassthroughSelection, SelectionHost};

/// The single entry point the UI talks to.
///
/// Channel names are resolved against the closed capability set; engine
/// operations go over HTTP and selection intents stay with the host.
pub struct EngineBridge {
    supervisor: Option<Arc<EngineSupervisor>>,
    gateway: EngineGateway,
    history: HistoryProxy,
    relay: ProgressRelay,
    selection: Arc<dyn SelectionHost>,
}

impl EngineBridge {
    /// Bridge to an engine this process does not own.
    pub fn attach(
        endpoint: EngineEndpoint,
        gateway_config: GatewayConfig,
        progress_buffer: usize,
    ) -> Self {
        let gateway = EngineGateway::with_config(endpoint.clone(), gateway_config);
        Self {
            supervisor: None,
            history: HistoryProxy::new(gateway.clone()),
            gateway,
            relay: ProgressRelay::with_buffer(endpoint, progress_buffer),
            selection: Arc::new(PassthroughSelection),
        }
    }

    pub(crate) fn supervised(
        supervisor: Arc<EngineSupervisor>,
        gateway_config: GatewayConfig,
        progress_buffer: usize,
    ) -> Self {
        let mut bridge = Self::attach(supervisor.endpoint(), gateway_config, progress_buffer);
        bridge.supervisor = Some(supervisor);
        bridge
    }

    pub fn with_selection_host(mut self, selection: Arc<dyn SelectionHost>) -> Self {
        self.selection = selection;
        self
    }

    pub fn endpoint(&self) -> &EngineEndpoint {
        self.gateway.endpoint()
    }

    pub fn supervisor(&self) -> Option<&EngineSupervisor> {
        self.supervisor.as_deref()
    }

    pub fn gateway(&self) -> &EngineGateway {
        &self.gateway
    }

    /// Registration point for progress notifications.
    pub fn on_progress(&self) -> broadcast::Receiver<ProgressNotification> {
        self.relay.on_progress()
    }

    pub async fn invoke(&self, channel: &str, payload: Value) -> Envelope {
        let capability = match channel.parse::<Capability>() {
            Ok(capability) => capability,
            Err(error) => {
                tracing::warn!(channel, "rejected unknown channel");
                return Envelope::from_error(&error);
            }
        };

        let envelope = self.dispatch(capability, payload).await;
        tracing::debug!(
            capability = %capability,
            success = envelope.is_success(),
            "bridge call completed"
        );
        envelope
    }

    pub async fn dispatch(&self, capability: Capability, payload: Value) -> Envelope {
        match capability {
            Capability::Engine(operation) => self.dispatch_engine(operation, payload).await,
            Capability::Selection(intent) => self.dispatch_selection(intent, payload).await,
        }
    }

    async fn dispatch_engine(&self, operation: EngineOperation, payload: Value) -> Envelope {
        match operation {
            EngineOperation::History => self.history.list().await,
            EngineOperation::SubscribeProgress => self.relay.subscribe(),
            EngineOperation::Undo => match string_argument(&payload, "operationId") {
                Some(operation_id) => self.history.undo(operation_id).await,
                None => self.gateway.call(operation, payload).await,
            },
            EngineOperation::SuggestPath => match string_argument(&payload, "path") {
                Some(path) => self.gateway.suggest_path(path).await,
                None => self.gateway.call(operation, payload).await,
            },
            EngineOperation::CheckPassword => match string_argument(&payload, "password") {
                Some(password) => self.gateway.check_password(password).await,
                None => self.gateway.call(operation, payload).await,
            },
            EngineOperation::Encrypt
            | EngineOperation::Decrypt
            | EngineOperation::Keygen
            | EngineOperation::Info => self.gateway.call(operation, payload).await,
        }
    }

    async fn dispatch_selection(&self, intent: SelectionIntent, payload: Value) -> Envelope {
        match self.selection.select(intent, &payload).await {
            Ok(Some(path)) => Envelope::success(Value::String(path)),
            Ok(None) => Envelope::acknowledged(),
            Err(error) => Envelope::failure(error),
        }
    }

    /// Closes progress subscriptions and stops the engine if this bridge owns it.
    pub async fn shutdown(&self) {
        let closed = self.relay.close_all();
        if closed > 0 {
            tracing::info!(closed, "closed progress subscriptions");
        }
        if let Some(supervisor) = &self.supervisor {
            supervisor.stop().await;
        }
    }
}

/// Unwraps a bare string payload or the string under `key`. Anything else is
/// forwarded untouched so the engine answers it.
fn string_argument<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    match payload {
        Value::String(value) => Some(value.as_str()),
        Value::Object(map) => map.get(key).and_then(Value::as_str),
        _ => None,
    }
}
