//! Error surface of the shell process.
//!
//! Engine call failures never appear here; they travel to the UI as envelopes.

use ecrypto_config::ConfigError;
use ecrypto_protocol::EngineError;
use thiserror::Error;

pub type ShellResult<T> = Result<T, ShellError>;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("invalid command line: {0}")]
    Cli(String),
    #[error("failed to initialize logging: {0}")]
    Logging(String),
    #[error("host channel i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    pub fn cli(message: impl Into<String>) -> Self {
        Self::Cli(message.into())
    }

    pub fn as_engine(&self) -> Option<&EngineError> {
        match self {
            Self::Engine(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_errors_keep_their_message() {
        let error = ShellError::from(EngineError::Spawn("'ecrypto': not found".to_owned()));
        assert_eq!(error.to_string(), "failed to launch engine: 'ecrypto': not found");
        assert!(error.as_engine().is_some_and(EngineError::is_fatal_to_startup));
    }

    #[test]
    fn cli_errors_are_prefixed() {
        let error = ShellError::cli("Unknown flag '--nope'");
        assert_eq!(error.to_string(), "invalid command line: Unknown flag '--nope'");
        assert!(error.as_engine().is_none());
    }
}
