use crate::{Error, Result};
use core::time::Duration;

/// Default interval after which a waiting worker or coordinator re-checks its
/// wake-up condition, even without a notification.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2);

/// What a worker does when it dispatches a message whose tag has no handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MissingHandlerPolicy {
    /// Skip the message. No response is produced and the worker keeps going.
    #[default]
    Ignore,
    /// Stop the worker cleanly. Pool capacity degrades by one.
    TerminateWorker,
    /// Stop the worker and report [`Error::MissingHandler`] at teardown.
    Fatal,
}

/// Construction-time settings of a worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of workers. Fixed for the lifetime of the pool.
    pub workers: usize,
    /// Upper bound on how long a blocked worker or coordinator sleeps before
    /// re-checking the queue.
    pub poll_interval: Duration,
    pub missing_handler: MissingHandlerPolicy,
}

impl PoolConfig {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            poll_interval: DEFAULT_POLL_INTERVAL,
            missing_handler: MissingHandlerPolicy::default(),
        }
    }

    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub const fn with_missing_handler(mut self, policy: MissingHandlerPolicy) -> Self {
        self.missing_handler = policy;
        self
    }

    /// Checks the configuration before any worker is spawned.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the pool would have no workers, more
    /// workers than fit in a [`WorkerId`](crate::WorkerId), or a zero poll
    /// interval.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::InvalidConfig {
                reason: "worker count must be greater than 0".into(),
            });
        }
        if u32::try_from(self.workers).is_err() {
            return Err(Error::InvalidConfig {
                reason: format!("worker count {} exceeds u32::MAX", self.workers),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig {
                reason: "poll interval must be non-zero".into(),
            });
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(1)
    }
}
