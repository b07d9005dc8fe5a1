#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerState {
    /// No process has been spawned yet.
    #[default]
    Idle,
    Starting,
    Ready,
    Failed,
    Terminated,
}

impl WorkerState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Terminated)
    }

    pub fn has_process(self) -> bool {
        matches!(self, Self::Starting | Self::Ready)
    }

    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: WorkerState) -> bool {
        match (self, next) {
            (Self::Idle, Self::Starting | Self::Failed) => true,
            (Self::Starting, Self::Ready | Self::Terminated) => true,
            (Self::Ready, Self::Terminated) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessSignal {
    /// A readiness marker was seen on stdout or stderr.
    OutputMarker,
    /// Nothing was heard before the fallback timeout; treated as ready.
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub signal: ReadinessSignal,
    pub pid: Option<u32>,
}
