use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
}

/// Operations forwarded to the engine's local HTTP API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineOperation {
    Encrypt,
    Decrypt,
    Keygen,
    Info,
    History,
    Undo,
    SuggestPath,
    CheckPassword,
    SubscribeProgress,
}

impl EngineOperation {
    pub const ALL: [EngineOperation; 9] = [
        Self::Encrypt,
        Self::Decrypt,
        Self::Keygen,
        Self::Info,
        Self::History,
        Self::Undo,
        Self::SuggestPath,
        Self::CheckPassword,
        Self::SubscribeProgress,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Encrypt => "encrypt",
            Self::Decrypt => "decrypt",
            Self::Keygen => "keygen",
            Self::Info => "info",
            Self::History => "history",
            Self::Undo => "undo",
            Self::SuggestPath => "suggest-path",
            Self::CheckPassword => "check-password",
            Self::SubscribeProgress => "subscribe-progress",
        }
    }

    pub fn route(self) -> &'static str {
        match self {
            Self::Encrypt => "/encrypt",
            Self::Decrypt => "/decrypt",
            Self::Keygen => "/keygen",
            Self::Info => "/info",
            Self::History => "/history",
            Self::Undo => "/undo",
            Self::SuggestPath => "/suggest-path",
            Self::CheckPassword => "/check-password",
            Self::SubscribeProgress => "/progress",
        }
    }

    pub fn method(self) -> HttpMethod {
        match self {
            Self::History | Self::SubscribeProgress => HttpMethod::Get,
            _ => HttpMethod::Post,
        }
    }

    /// Whether the call is a plain request/response exchange.
    pub fn is_request_response(self) -> bool {
        !matches!(self, Self::SubscribeProgress)
    }
}

/// Selection intents answered by the UI host; they never reach the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionIntent {
    SelectFolder,
    SelectFile,
    SaveFile,
}

impl SelectionIntent {
    pub const ALL: [SelectionIntent; 3] = [Self::SelectFolder, Self::SelectFile, Self::SaveFile];

    pub fn name(self) -> &'static str {
        match self {
            Self::SelectFolder => "select-folder",
            Self::SelectFile => "select-file",
            Self::SaveFile => "save-file",
        }
    }
}

/// The closed set of names a UI may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Engine(EngineOperation),
    Selection(SelectionIntent),
}

impl Capability {
    pub fn name(self) -> &'static str {
        match self {
            Self::Engine(operation) => operation.name(),
            Self::Selection(intent) => intent.name(),
        }
    }

    pub fn all() -> impl Iterator<Item = Capability> {
        EngineOperation::ALL
            .into_iter()
            .map(Capability::Engine)
            .chain(SelectionIntent::ALL.into_iter().map(Capability::Selection))
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = EngineError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let name = trimmed
            .strip_prefix("api:")
            .or_else(|| trimmed.strip_prefix("dialog:"))
            .unwrap_or(trimmed);

        let capability = match name {
            "encrypt" => Self::Engine(EngineOperation::Encrypt),
            "decrypt" => Self::Engine(EngineOperation::Decrypt),
            "keygen" | "generate-key" | "generateKey" => Self::Engine(EngineOperation::Keygen),
            "info" | "getInfo" => Self::Engine(EngineOperation::Info),
            "history" | "getHistory" => Self::Engine(EngineOperation::History),
            "undo" | "undoOperation" => Self::Engine(EngineOperation::Undo),
            "suggest-path" | "suggestPath" => Self::Engine(EngineOperation::SuggestPath),
            "check-password" | "checkPassword" => Self::Engine(EngineOperation::CheckPassword),
            "subscribe-progress" | "subscribeProgress" => {
                Self::Engine(EngineOperation::SubscribeProgress)
            }
            "select-folder" | "selectFolder" => Self::Selection(SelectionIntent::SelectFolder),
            "select-file" | "selectFile" => Self::Selection(SelectionIntent::SelectFile),
            "save-file" | "saveFile" => Self::Selection(SelectionIntent::SaveFile),
            _ => {
                return Err(EngineError::Protocol(format!(
                    "unsupported operation '{trimmed}'"
                )))
            }
        };
        Ok(capability)
    }
}
