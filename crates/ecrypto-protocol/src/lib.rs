//! Shared contracts between the desktop shell and the ecrypto engine process.
//!
//! Nothing in here talks to the engine; it only names the capability surface,
//! the uniform result envelope, and the records mirrored from the engine.

pub mod capability;
pub mod envelope;
pub mod error;
pub mod operation;
pub mod progress;

pub use capability::{Capability, EngineOperation, HttpMethod, SelectionIntent};
pub use envelope::Envelope;
pub use error::{EngineError, EngineResult};
pub use operation::{parse_operation_list, OperationKind, OperationRecord};
pub use progress::{
    parse_progress_frame, ProgressEvent, ProgressNotification, ProgressUpdate, StreamEnd,
    SubscriptionId,
};

/// Location of the one engine instance this shell talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEndpoint {
    base_url: String,
}

impl EngineEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn local(host: &str, port: u16) -> Self {
        Self::new(format!("http://{host}:{port}"))
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn url(&self, route: &str) -> String {
        format!("{}{route}", self.base_url)
    }
}
