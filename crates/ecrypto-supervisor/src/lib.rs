//! Engine process supervision: spawn, readiness, exit observation, shutdown.

pub mod readiness;
pub mod state;
pub mod supervisor;

pub use readiness::ReadinessGate;
pub use state::{Readiness, ReadinessSignal, WorkerState};
pub use supervisor::{
    default_server_args, EngineSupervisor, EngineSupervisorConfig, DEFAULT_ENGINE_BINARY,
    DEFAULT_ENGINE_HOST, DEFAULT_ENGINE_PORT, DEFAULT_READINESS_TIMEOUT, DEFAULT_READY_MARKER,
};
