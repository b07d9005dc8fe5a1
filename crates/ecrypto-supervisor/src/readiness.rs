use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::state::ReadinessSignal;

/// Resolves exactly once, whichever readiness path gets there first.
#[derive(Debug)]
pub struct ReadinessGate {
    resolved: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<ReadinessSignal>>>,
}

impl ReadinessGate {
    pub fn new() -> (Self, oneshot::Receiver<ReadinessSignal>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                resolved: AtomicBool::new(false),
                sender: Mutex::new(Some(sender)),
            },
            receiver,
        )
    }

    /// Returns `true` only for the call that won the race.
    pub fn resolve(&self, signal: ReadinessSignal) -> bool {
        if self.resolved.swap(true, Ordering::SeqCst) {
            return false;
        }
        let sender = match self.sender.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sender) = sender {
            let _ = sender.send(signal);
        }
        true
    }
}

/// Case-sensitive substring match, as printed by the engine's startup log.
pub fn line_has_marker(line: &str, markers: &[String]) -> bool {
    markers
        .iter()
        .filter(|marker| !marker.is_empty())
        .any(|marker| line.contains(marker.as_str()))
}
