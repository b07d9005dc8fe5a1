use async_trait::async_trait;
use ecrypto_protocol::SelectionIntent;
use serde_json::Value;

/// Answers path-selection intents on behalf of the UI host.
///
/// `Ok(None)` means the user dismissed the picker. Implementations never talk
/// to the engine.
#[async_trait]
pub trait SelectionHost: Send + Sync {
    async fn select(
        &self,
        intent: SelectionIntent,
        payload: &Value,
    ) -> Result<Option<String>, String>;
}

/// Headless host: the caller already knows the path and passes it in the
/// payload, either as a bare string or as `{"path": ...}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSelection;

#[async_trait]
impl SelectionHost for PassthroughSelection {
    async fn select(
        &self,
        intent: SelectionIntent,
        payload: &Value,
    ) -> Result<Option<String>, String> {
        let path = match payload {
            Value::String(path) => Some(path.as_str()),
            Value::Object(map) => map.get("path").and_then(Value::as_str),
            Value::Null => None,
            _ => {
                return Err(format!(
                    "{} expects a path string or {{\"path\": ...}}",
                    intent.name()
                ))
            }
        };
        Ok(path
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(ToOwned::to_owned))
    }
}
