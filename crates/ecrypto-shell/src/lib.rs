//! Desktop-side host for the ecrypto engine.
//!
//! [`bootstrap`] starts the engine and returns an [`EngineBridge`], the only
//! surface a UI needs: `invoke(channel, payload)` for calls and
//! `on_progress()` for pushed progress notifications.

mod bootstrap;
mod bridge;
pub mod cli;
mod error;
pub mod logging;
mod selection;
pub mod stdio;

pub use bootstrap::bootstrap;
pub use bridge::EngineBridge;
pub use error::{ShellError, ShellResult};
pub use selection::{PassthroughSelection, SelectionHost};
