use std::sync::atomic::{AtomicU8, Ordering};

/// Pipeline lifecycle.
///
/// ```text
/// idle → starting → running → stopping → stopped
///            ↓          ↓          ↓
///          failed ←─────┴──────────┘
/// ```
///
/// Progression is monotonic; a session never moves back to an earlier state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PipelineState {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
    Failed = 5,
}

impl PipelineState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Stopped,
            _ => Self::Failed,
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The state word shared between the caller thread and the worker.
///
/// A single atomic with acquire/release ordering; no lock is needed since
/// transitions only ever move forward.
#[derive(Debug)]
pub struct AtomicPipelineState(AtomicU8);

impl AtomicPipelineState {
    pub fn new(state: PipelineState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: PipelineState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Move `from → to` only if the current state is still `from`.
    pub fn transition(&self, from: PipelineState, to: PipelineState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(PipelineState::Stopped.is_terminal());
        assert!(PipelineState::Failed.is_terminal());
        assert!(!PipelineState::Stopping.is_terminal());
        assert!(!PipelineState::Idle.is_terminal());
    }

    #[test]
    fn atomic_round_trips_every_state() {
        let cell = AtomicPipelineState::new(PipelineState::Idle);
        for state in [
            PipelineState::Starting,
            PipelineState::Running,
            PipelineState::Stopping,
            PipelineState::Stopped,
            PipelineState::Failed,
        ] {
            cell.store(state);
            assert_eq!(cell.load(), state);
        }
    }

    #[test]
    fn transition_only_from_expected_state() {
        let cell = AtomicPipelineState::new(PipelineState::Running);
        assert!(!cell.transition(PipelineState::Idle, PipelineState::Starting));
        assert!(cell.transition(PipelineState::Running, PipelineState::Stopping));
        assert_eq!(cell.load(), PipelineState::Stopping);
    }
}
