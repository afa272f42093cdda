use core::fmt;
use portable_atomic::{AtomicU8, Ordering};

/// Lifecycle of a single worker.
///
/// ```text
/// Waiting -> Running -> Waiting      (per dispatched message)
/// Waiting -> Terminated              (quit sentinel or fatal dispatch error)
/// ```
///
/// `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum WorkerState {
    Waiting = 0,
    Running = 1,
    Terminated = 2,
}

impl WorkerState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Waiting,
            1 => Self::Running,
            _ => Self::Terminated,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Running => write!(f, "running"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// A [`WorkerState`] shared between a worker thread and its observers.
#[derive(Debug, Default)]
pub struct WorkerStatus(AtomicU8);

impl WorkerStatus {
    pub fn get(&self) -> WorkerState {
        WorkerState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` unless already terminated. Returns the state that was
    /// actually stored.
    pub(crate) fn transition(&self, next: WorkerState) -> WorkerState {
        let prev = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                match WorkerState::from_raw(raw) {
                    WorkerState::Terminated => None,
                    _ => Some(next as u8),
                }
            });
        match prev {
            Ok(_) => next,
            Err(_) => WorkerState::Terminated,
        }
    }
}

/// Phase of the coordinator's mining round protocol.
///
/// ```text
/// Idle -> Broadcasting -> AwaitingCompletion -> Harvesting
///      -> Validating -> Persisting -> Idle
///                    \-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum RoundState {
    #[default]
    Idle = 0,
    Broadcasting = 1,
    AwaitingCompletion = 2,
    Harvesting = 3,
    Validating = 4,
    Persisting = 5,
    /// The last round produced no valid response. The next round may start
    /// from here as from `Idle`.
    Failed = 6,
}

impl RoundState {
    const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Broadcasting,
            2 => Self::AwaitingCompletion,
            3 => Self::Harvesting,
            4 => Self::Validating,
            5 => Self::Persisting,
            _ => Self::Failed,
        }
    }
}

impl fmt::Display for RoundState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Broadcasting => "broadcasting",
            Self::AwaitingCompletion => "awaiting-completion",
            Self::Harvesting => "harvesting",
            Self::Validating => "validating",
            Self::Persisting => "persisting",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A [`RoundState`] readable while a round is running.
#[derive(Debug, Default)]
pub struct RoundStatus(AtomicU8);

impl RoundStatus {
    pub fn get(&self) -> RoundState {
        RoundState::from_raw(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, next: RoundState) {
        self.0.store(next as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminated_is_absorbing() {
        let status = WorkerStatus::default();
        assert_eq!(status.get(), WorkerState::Waiting);

        assert_eq!(status.transition(WorkerState::Running), WorkerState::Running);
        assert_eq!(status.transition(WorkerState::Waiting), WorkerState::Waiting);
        assert_eq!(
            status.transition(WorkerState::Terminated),
            WorkerState::Terminated
        );

        assert_eq!(
            status.transition(WorkerState::Running),
            WorkerState::Terminated
        );
        assert_eq!(status.get(), WorkerState::Terminated);
    }

    #[test]
    fn round_status_reports_every_phase() {
        let status = RoundStatus::default();
        assert_eq!(status.get(), RoundState::Idle);

        for phase in [
            RoundState::Broadcasting,
            RoundState::AwaitingCompletion,
            RoundState::Harvesting,
            RoundState::Validating,
            RoundState::Persisting,
            RoundState::Failed,
            RoundState::Idle,
        ] {
            status.set(phase);
            assert_eq!(status.get(), phase);
        }
    }
}
