use std::fmt;

use serde::{Deserialize, Serialize};

const REDACTED: &str = "<redacted>";

/// Payload shared by the encrypt and decrypt routes.
///
/// Either a password or a key file is expected depending on `use_key`; the
/// engine decides what is acceptable.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoRequest {
    pub input_path: String,
    pub output_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
    #[serde(default)]
    pub use_key: bool,
}

pub type EncryptRequest = CryptoRequest;
pub type DecryptRequest = CryptoRequest;

impl CryptoRequest {
    pub fn with_password(
        input_path: impl Into<String>,
        output_path: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            password: Some(password.into()),
            key_file: None,
            use_key: false,
        }
    }

    pub fn with_key_file(
        input_path: impl Into<String>,
        output_path: impl Into<String>,
        key_file: impl Into<String>,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            output_path: output_path.into(),
            password: None,
            key_file: Some(key_file.into()),
            use_key: true,
        }
    }
}

impl fmt::Debug for CryptoRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoRequest")
            .field("input_path", &self.input_path)
            .field("output_path", &self.output_path)
            .field("password", &self.password.as_ref().map(|_| REDACTED))
            .field("key_file", &self.key_file)
            .field("use_key", &self.use_key)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeygenRequest {
    /// Empty asks the engine to return the key without writing it anywhere.
    #[serde(default)]
    pub output_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoRequest {
    pub file_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestPathRequest {
    pub path: String,
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckPasswordRequest {
    pub password: String,
}

impl fmt::Debug for CheckPasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckPasswordRequest")
            .field("password", &REDACTED)
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoRequest {
    pub operation_id: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn crypto_request_uses_engine_field_names() {
        let request = CryptoRequest::with_password("/docs", "/docs.ecrypt", "hunter2");
        let value = serde_json::to_value(&request).expect("serialize request");
        assert_eq!(
            value,
            json!({
                "inputPath": "/docs",
                "outputPath": "/docs.ecrypt",
                "password": "hunter2",
                "useKey": false
            })
        );
    }

    #[test]
    fn key_file_request_omits_password() {
        let request = CryptoRequest::with_key_file("/a.ecrypt", "/a", "/keys/main.key");
        let value = serde_json::to_value(&request).expect("serialize request");
        assert_eq!(value["keyFile"], "/keys/main.key");
        assert_eq!(value["useKey"], true);
        assert!(value.get("password").is_none());
    }

    #[test]
    fn debug_output_never_contains_secrets() {
        let request = CryptoRequest::with_password("/in", "/out", "hunter2");
        assert!(!format!("{request:?}").contains("hunter2"));
        let check = CheckPasswordRequest {
            password: "hunter2".to_owned(),
        };
        assert!(!format!("{check:?}").contains("hunter2"));
    }

    #[test]
    fn undo_request_uses_operation_id_field() {
        let value = serde_json::to_value(UndoRequest {
            operation_id: "op-3".to_owned(),
        })
        .expect("serialize undo");
        assert_eq!(value, json!({"operationId": "op-3"}));
    }
}
