use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;

const UNKNOWN_FAILURE_MESSAGE: &str = "engine request failed without an error message";

/// Uniform result of every UI-facing call.
///
/// On the wire this is `{"success": true, "data": ...}` or
/// `{"success": false, "error": "..."}`. A failure message is never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "EnvelopeWire", try_from = "EnvelopeWire")]
pub enum Envelope {
    Success { data: Value },
    Failure { error: String },
}

impl Envelope {
    pub fn success(data: Value) -> Self {
        Self::Success { data }
    }

    pub fn acknowledged() -> Self {
        Self::Success { data: Value::Null }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        let error = error.into();
        let trimmed = error.trim();
        if trimmed.is_empty() {
            return Self::Failure {
                error: UNKNOWN_FAILURE_MESSAGE.to_owned(),
            };
        }
        Self::Failure {
            error: trimmed.to_owned(),
        }
    }

    pub fn from_error(error: &EngineError) -> Self {
        Self::failure(error.to_string())
    }

    pub fn from_result(result: Result<Value, EngineError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(error) => Self::from_error(&error),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Success { data } => Some(data),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error } => Some(error.as_str()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<Envelope> for EnvelopeWire {
    fn from(envelope: Envelope) -> Self {
        match envelope {
            Envelope::Success { data } => Self {
                success: true,
                data,
                error: None,
            },
            Envelope::Failure { error } => Self {
                success: false,
                data: Value::Null,
                error: Some(error),
            },
        }
    }
}

impl TryFrom<EnvelopeWire> for Envelope {
    type Error = String;

    fn try_from(wire: EnvelopeWire) -> Result<Self, Self::Error> {
        if wire.success {
            if wire.error.is_some() {
                return Err("successful envelope must not carry an error".to_owned());
            }
            Ok(Self::Success { data: wire.data })
        } else {
            Ok(Self::failure(wire.error.unwrap_or_default()))
        }
    }
}
