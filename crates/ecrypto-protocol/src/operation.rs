use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationKind {
    Encrypt,
    Decrypt,
    Keygen,
    Other(String),
}

impl OperationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::Keygen => "keygen",
            Self::Other(value) => value.as_str(),
        }
    }
}

impl From<String> for OperationKind {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "encrypt" => Self::Encrypt,
            "decrypt" => Self::Decrypt,
            "keygen" => Self::Keygen,
            _ => Self::Other(value),
        }
    }
}

impl From<OperationKind> for String {
    fn from(kind: OperationKind) -> Self {
        kind.as_str().to_owned()
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A history entry mirrored from the engine's ledger. Never mutated locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    #[serde(default, alias = "inputPath")]
    pub input_path: String,
    #[serde(default, alias = "outputPath")]
    pub output_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reversible: Option<bool>,
}

fn default_success() -> bool {
    true
}

impl OperationRecord {
    /// Only successful encryptions can be undone unless the engine says otherwise.
    pub fn is_reversible(&self) -> bool {
        self.reversible
            .unwrap_or(self.success && self.kind == OperationKind::Encrypt)
    }

    /// Copy with the reversibility flag materialized for UI consumption.
    pub fn with_resolved_reversibility(mut self) -> Self {
        self.reversible = Some(self.is_reversible());
        self
    }
}

/// Extracts the operation list from any of the body shapes the engine is known to use:
/// `{"data": {"operations": [...]}}`, `{"operations": [...]}`, `{"data": [...]}` or a bare array.
pub fn parse_operation_list(body: &Value) -> Result<Vec<OperationRecord>, String> {
    let list = locate_operation_array(body)
        .ok_or_else(|| "history response did not contain an operation list".to_owned())?;
    serde_json::from_value::<Vec<OperationRecord>>(Value::Array(list.clone()))
        .map_err(|error| format!("history response contained malformed operations: {error}"))
}

fn locate_operation_array(body: &Value) -> Option<&Vec<Value>> {
    match body {
        Value::Array(items) => Some(items),
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("operations") {
                return Some(items);
            }
            match map.get("data") {
                Some(Value::Null) => None,
                Some(data) => locate_operation_array(data),
                None => None,
            }
        }
        _ => None,
    }
}
