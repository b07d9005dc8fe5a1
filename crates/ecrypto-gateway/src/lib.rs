//! HTTP side of the engine bridge: request/response calls, history and undo,
//! and the progress event relay.
//!
//! All three hold only an [`ecrypto_protocol::EngineEndpoint`]; none of them
//! can start or stop the engine.

mod gateway;
mod history;
mod progress;
mod requests;
pub mod sse;

pub use gateway::{interpret_response, EngineGateway, GatewayConfig, PendingCall};
pub use history::HistoryProxy;
pub use progress::{ProgressRelay, DEFAULT_PROGRESS_BUFFER};
pub use requests::{
    CheckPasswordRequest, CryptoRequest, DecryptRequest, EncryptRequest, InfoRequest,
    KeygenRequest, SuggestPathRequest, UndoRequest,
};
