use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("failed to launch engine: {0}")]
    Spawn(String),
    #[error("engine lifecycle error: {0}")]
    Lifecycle(String),
    #[error("{0}")]
    Transport(String),
    #[error("{message}")]
    Application { status: u16, message: String },
    #[error("engine progress stream failed: {0}")]
    Stream(String),
    #[error("engine protocol error: {0}")]
    Protocol(String),
    #[error("request cancelled")]
    Cancelled,
}

impl EngineError {
    /// Errors that abort application startup rather than surfacing as an envelope.
    pub fn is_fatal_to_startup(&self) -> bool {
        matches!(self, Self::Spawn(_))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_launch_failures_abort_startup() {
        assert!(EngineError::Spawn("missing".to_owned()).is_fatal_to_startup());
        assert!(!EngineError::Transport("refused".to_owned()).is_fatal_to_startup());
        assert!(!EngineError::Cancelled.is_fatal_to_startup());
    }
}
