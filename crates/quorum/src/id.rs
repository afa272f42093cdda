use core::fmt;
use portable_atomic::{AtomicU64, Ordering};

/// Identity of a [`Message`] or [`Response`], unique and strictly increasing
/// for the lifetime of the [`IdSequence`] that issued it.
///
/// [`Message`]: crate::Message
/// [`Response`]: crate::Response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct MessageId(u64);

impl MessageId {
    /// Wraps a raw id. Ids are normally issued by an [`IdSequence`].
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable identity of a worker within one pool, numbered `1..=N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct WorkerId(u32);

impl WorkerId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Sender {
    /// Reserved identity for messages originating from the coordinator.
    Coordinator,
    /// A pool worker.
    Worker(WorkerId),
}

impl Sender {
    /// Returns `true` if this sender is the given worker.
    pub fn is(&self, worker: WorkerId) -> bool {
        matches!(self, Self::Worker(id) if *id == worker)
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coordinator => write!(f, "coordinator"),
            Self::Worker(id) => write!(f, "{id}"),
        }
    }
}

/// A lock-free counter issuing [`MessageId`]s.
///
/// One sequence is owned by each [`Coordinator`] and shared with its workers,
/// so broadcast messages and worker responses draw from the same id space.
/// The first id issued is `1`.
///
/// ## Features
///
/// - ✅ Thread-safe
/// - ✅ Strictly increasing across all callers
/// - ❌ Not persisted: a new sequence restarts at `1`
///
/// [`Coordinator`]: crate::Coordinator
#[derive(Debug, Default)]
pub struct IdSequence {
    #[cfg(feature = "cache-padded")]
    last: crossbeam_utils::CachePadded<AtomicU64>,
    #[cfg(not(feature = "cache-padded"))]
    last: AtomicU64,
}

impl IdSequence {
    /// Creates a sequence whose first issued id is `1`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues the next id.
    ///
    /// # Example
    /// ```
    /// use quorum::IdSequence;
    ///
    /// let ids = IdSequence::new();
    /// let a = ids.next_id();
    /// let b = ids.next_id();
    /// assert!(a < b);
    /// assert_eq!(a.to_raw(), 1);
    /// ```
    pub fn next_id(&self) -> MessageId {
        MessageId(self.last.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Returns the most recently issued id, if any.
    pub fn last_issued(&self) -> Option<MessageId> {
        match self.last.load(Ordering::Acquire) {
            0 => None,
            raw => Some(MessageId(raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::thread::scope;

    #[test]
    fn ids_start_at_one_and_increase() {
        let ids = IdSequence::new();
        assert_eq!(ids.last_issued(), None);

        let issued: Vec<_> = (0..16).map(|_| ids.next_id()).collect();
        assert_eq!(issued[0], MessageId::from_raw(1));
        assert!(issued.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ids.last_issued(), Some(MessageId::from_raw(16)));
    }

    #[test]
    fn ids_are_unique_across_threads() {
        const THREADS: usize = 8;
        const IDS_PER_THREAD: usize = 1024;

        let ids = Arc::new(IdSequence::new());
        let seen = Arc::new(Mutex::new(HashSet::with_capacity(THREADS * IDS_PER_THREAD)));

        scope(|s| {
            for _ in 0..THREADS {
                let ids = Arc::clone(&ids);
                let seen = Arc::clone(&seen);
                s.spawn(move || {
                    let mut last = MessageId::from_raw(0);
                    for _ in 0..IDS_PER_THREAD {
                        let id = ids.next_id();
                        // each caller observes its own ids strictly increasing
                        assert!(id > last);
                        last = id;
                        assert!(seen.lock().unwrap().insert(id));
                    }
                });
            }
        });

        assert_eq!(seen.lock().unwrap().len(), THREADS * IDS_PER_THREAD);
    }

    #[test]
    fn sender_matches_only_its_worker() {
        let w1 = WorkerId::new(1);
        assert!(Sender::Worker(w1).is(w1));
        assert!(!Sender::Worker(w1).is(WorkerId::new(2)));
        assert!(!Sender::Coordinator.is(w1));
    }
}
