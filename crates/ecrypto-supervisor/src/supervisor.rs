use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use ecrypto_protocol::{EngineEndpoint, EngineError, EngineResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::readiness::{line_has_marker, ReadinessGate};
use crate::state::{Readiness, ReadinessSignal, WorkerState};

pub const DEFAULT_ENGINE_BINARY: &str = "ecrypto";
pub const DEFAULT_ENGINE_HOST: &str = "127.0.0.1";
pub const DEFAULT_ENGINE_PORT: u16 = 8765;
pub const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_READY_MARKER: &str = "Server started";
const PORT_PLACEHOLDER: &str = "{port}";
const HOST_PLACEHOLDER: &str = "{host}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSupervisorConfig {
    pub binary: PathBuf,
    pub host: String,
    pub port: u16,
    /// Server-mode arguments; `{port}` and `{host}` are substituted at launch.
    pub server_args: Vec<String>,
    pub ready_markers: Vec<String>,
    pub readiness_timeout: Duration,
}

impl Default for EngineSupervisorConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_ENGINE_BINARY),
            host: DEFAULT_ENGINE_HOST.to_owned(),
            port: DEFAULT_ENGINE_PORT,
            server_args: default_server_args(),
            ready_markers: vec![DEFAULT_READY_MARKER.to_owned()],
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
        }
    }
}

pub fn default_server_args() -> Vec<String> {
    vec!["--serve".to_owned(), format!("--port={PORT_PLACEHOLDER}")]
}

impl EngineSupervisorConfig {
    pub fn launch_args(&self) -> Vec<String> {
        let port = self.port.to_string();
        self.server_args
            .iter()
            .map(|arg| {
                arg.replace(PORT_PLACEHOLDER, port.as_str())
                    .replace(HOST_PLACEHOLDER, self.host.as_str())
            })
            .collect()
    }

    pub fn endpoint(&self) -> EngineEndpoint {
        EngineEndpoint::local(self.host.as_str(), self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputStream {
    Stdout,
    Stderr,
}

struct ProcessHandle {
    pid: Option<u32>,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_task: JoinHandle<()>,
}

/// Owns the single engine process for the lifetime of the shell.
///
/// Only this type starts or kills the process. Everything else receives the
/// [`EngineEndpoint`] and learns about reachability by making calls.
pub struct EngineSupervisor {
    config: EngineSupervisorConfig,
    state: Arc<watch::Sender<WorkerState>>,
    process: AsyncMutex<Option<ProcessHandle>>,
}

impl EngineSupervisor {
    pub fn new(config: EngineSupervisorConfig) -> Self {
        let (state, _) = watch::channel(WorkerState::Idle);
        Self {
            config,
            state: Arc::new(state),
            process: AsyncMutex::new(None),
        }
    }

    pub fn config(&self) -> &EngineSupervisorConfig {
        &self.config
    }

    pub fn endpoint(&self) -> EngineEndpoint {
        self.config.endpoint()
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub async fn pid(&self) -> Option<u32> {
        self.process
            .lock()
            .await
            .as_ref()
            .and_then(|handle| handle.pid)
    }

    /// Spawns the engine and waits for the first readiness signal.
    ///
    /// Fails only when the process cannot be launched or the supervisor was
    /// already started. An exit after a successful spawn is reported through
    /// [`EngineSupervisor::subscribe_state`], never through this result.
    pub async fn start(&self) -> EngineResult<Readiness> {
        let (ready_rx, timer, pid) = {
            let mut slot = self.process.lock().await;
            let current = self.state();
            if current != WorkerState::Idle {
                return Err(EngineError::Lifecycle(format!(
                    "engine supervisor already started (state {current:?})"
                )));
            }

            let args = self.config.launch_args();
            tracing::info!(
                binary = %self.config.binary.display(),
                args = ?args,
                "starting engine process"
            );

            let mut command = Command::new(&self.config.binary);
            command.args(&args);
            command.stdin(Stdio::null());
            command.stdout(Stdio::piped());
            command.stderr(Stdio::piped());
            command.kill_on_drop(true);

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(error) => {
                    transition(&self.state, WorkerState::Failed);
                    tracing::error!(
                        binary = %self.config.binary.display(),
                        error = %error,
                        "failed to spawn engine process"
                    );
                    return Err(EngineError::Spawn(format!(
                        "'{}': {error}",
                        self.config.binary.display()
                    )));
                }
            };
            transition(&self.state, WorkerState::Starting);

            let pid = child.id();
            let (gate, ready_rx) = ReadinessGate::new();
            let gate = Arc::new(gate);
            let markers = Arc::new(self.config.ready_markers.clone());

            if let Some(stdout) = child.stdout.take() {
                tokio::spawn(watch_output(
                    stdout,
                    OutputStream::Stdout,
                    Arc::clone(&gate),
                    Arc::clone(&markers),
                ));
            }
            if let Some(stderr) = child.stderr.take() {
                tokio::spawn(watch_output(
                    stderr,
                    OutputStream::Stderr,
                    Arc::clone(&gate),
                    Arc::clone(&markers),
                ));
            }

            let readiness_timeout = self.config.readiness_timeout;
            let timer = tokio::spawn({
                let gate = Arc::clone(&gate);
                async move {
                    tokio::time::sleep(readiness_timeout).await;
                    if gate.resolve(ReadinessSignal::Timeout) {
                        tracing::warn!(
                            timeout = ?readiness_timeout,
                            "no engine readiness marker observed; assuming ready"
                        );
                    }
                }
            });

            let (kill_tx, kill_rx) = oneshot::channel();
            let exit_task = tokio::spawn(watch_exit(child, kill_rx, Arc::clone(&self.state)));
            *slot = Some(ProcessHandle {
                pid,
                kill_tx: Some(kill_tx),
                exit_task,
            });
            (ready_rx, timer, pid)
        };

        // The timer task owns a gate reference, so the sender cannot vanish unresolved.
        let signal = ready_rx.await.unwrap_or(ReadinessSignal::Timeout);
        timer.abort();

        if transition(&self.state, WorkerState::Ready) {
            tracing::info!(pid = ?pid, signal = ?signal, "engine ready");
        } else {
            tracing::warn!(
                pid = ?pid,
                state = ?self.state(),
                "engine left the starting state before readiness resolved"
            );
        }

        Ok(Readiness { signal, pid })
    }

    /// Terminates the engine if it is running. Safe to call any number of times.
    pub async fn stop(&self) {
        let handle = self.process.lock().await.take();
        let Some(mut handle) = handle else {
            return;
        };

        if let Some(kill_tx) = handle.kill_tx.take() {
            let _ = kill_tx.send(());
        }
        if let Err(error) = (&mut handle.exit_task).await {
            if !error.is_cancelled() {
                tracing::warn!(error = %error, "engine exit watcher failed");
            }
        }
        tracing::info!(pid = ?handle.pid, "engine process stopped");
    }
}

fn transition(state: &watch::Sender<WorkerState>, next: WorkerState) -> bool {
    state.send_if_modified(|current| {
        if current.can_transition_to(next) {
            *current = next;
            true
        } else {
            false
        }
    })
}

async fn watch_output<R>(
    reader: R,
    stream: OutputStream,
    gate: Arc<ReadinessGate>,
    markers: Arc<Vec<String>>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buffer = Vec::new();
    loop {
        buffer.clear();
        match reader.read_until(b'\n', &mut buffer).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buffer);
                let line = line.trim_end_matches(['\r', '\n']);
                let has_marker = line_has_marker(line, &markers);
                if has_marker && gate.resolve(ReadinessSignal::OutputMarker) {
                    tracing::debug!(stream = ?stream, "engine readiness marker observed");
                }
                log_engine_line(stream, line, has_marker);
            }
            Err(error) => {
                tracing::debug!(stream = ?stream, error = %error, "engine output closed");
                break;
            }
        }
    }
}

fn log_engine_line(stream: OutputStream, line: &str, has_marker: bool) {
    if line.trim().is_empty() {
        return;
    }
    match stream {
        OutputStream::Stdout => {
            tracing::info!(target: "ecrypto_engine", stream = "stdout", "{line}");
        }
        // The engine's standard logger writes informational lines to stderr.
        OutputStream::Stderr if has_marker || line.contains("http://") => {
            tracing::info!(target: "ecrypto_engine", stream = "stderr", "{line}");
        }
        OutputStream::Stderr => {
            tracing::warn!(target: "ecrypto_engine", stream = "stderr", "{line}");
        }
    }
}

async fn watch_exit(
    mut child: Child,
    kill_rx: oneshot::Receiver<()>,
    state: Arc<watch::Sender<WorkerState>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = kill_rx => {
            if let Err(error) = child.start_kill() {
                tracing::debug!(error = %error, "engine kill request failed");
            }
            child.wait().await
        }
    };

    match status {
        Ok(status) => {
            tracing::info!(
                code = ?status.code(),
                success = status.success(),
                "engine process exited"
            );
        }
        Err(error) => {
            tracing::warn!(error = %error, "failed to observe engine process exit");
        }
    }
    transition(&state, WorkerState::Terminated);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_args_substitute_port_and_host() {
        let config = EngineSupervisorConfig {
            port: 9100,
            host: "localhost".to_owned(),
            server_args: vec![
                "--serve".to_owned(),
                "--port={port}".to_owned(),
                "--bind={host}:{port}".to_owned(),
            ],
            ..EngineSupervisorConfig::default()
        };
        assert_eq!(
            config.launch_args(),
            vec!["--serve", "--port=9100", "--bind=localhost:9100"]
        );
    }

    #[test]
    fn default_config_targets_loopback_engine() {
        let config = EngineSupervisorConfig::default();
        assert_eq!(config.launch_args(), vec!["--serve", "--port=8765"]);
        assert_eq!(config.endpoint().base_url(), "http://127.0.0.1:8765");
        assert_eq!(config.readiness_timeout, Duration::from_secs(2));
    }

    #[test]
    fn transitions_follow_lifecycle() {
        let (state, _) = watch::channel(WorkerState::Idle);
        assert!(!transition(&state, WorkerState::Ready));
        assert!(transition(&state, WorkerState::Starting));
        assert!(transition(&state, WorkerState::Ready));
        assert!(!transition(&state, WorkerState::Starting));
        assert!(transition(&state, WorkerState::Terminated));
        assert!(!transition(&state, WorkerState::Ready));
        assert_eq!(*state.borrow(), WorkerState::Terminated);
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let supervisor = EngineSupervisor::new(EngineSupervisorConfig::default());
        supervisor.stop().await;
        supervisor.stop().await;
        assert_eq!(supervisor.state(), WorkerState::Idle);
        assert_eq!(supervisor.pid().await, None);
    }
}
