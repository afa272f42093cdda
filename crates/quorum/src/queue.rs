//! The shared broadcast queue and its quorum barrier.
//!
//! Every live worker reads every queued message exactly once, in push order.
//! A message leaves the queue only when the set of workers that have read it
//! covers the set of live workers; until then it stays at the head and blocks
//! everything behind it. A single queue (rather than one per worker) keeps
//! memory bounded and delivery order identical for all workers, at the cost
//! that one slow worker holds up the whole pool.
//!
//! All quorum bookkeeping (the last-seen comparison, the reader set, the pop)
//! happens under one lock, so a worker can neither read the same head twice
//! nor skip a head that was popped between its check and its read.

use crate::{Error, Message, MessageId, Result, WorkerId};
use core::time::Duration;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::{
    collections::{BTreeSet, HashSet, VecDeque},
    sync::Arc,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// What a worker obtained from [`BroadcastQueue::next_for`].
#[derive(Debug)]
pub enum Claim<J> {
    /// A message the worker must dispatch. The worker must call
    /// [`BroadcastQueue::finish_dispatch`] once it is done with it.
    Dispatch(Arc<Message<J>>),
    /// A message authored by the claiming worker itself. It counts toward the
    /// quorum but is not dispatched.
    Acknowledged(Arc<Message<J>>),
}

impl<J> Claim<J> {
    pub fn message(&self) -> &Arc<Message<J>> {
        match self {
            Self::Dispatch(msg) | Self::Acknowledged(msg) => msg,
        }
    }
}

struct QueueState<J> {
    items: VecDeque<Arc<Message<J>>>,
    /// Workers that have read the current head.
    readers: HashSet<WorkerId>,
    live: BTreeSet<WorkerId>,
    in_flight: usize,
    removed: u64,
}

impl<J> QueueState<J> {
    fn is_settled(&self) -> bool {
        self.items.is_empty() && self.in_flight == 0
    }

    /// Whether `worker` still owes a read of the current head.
    fn unread_head(&self, worker: WorkerId, last_seen: Option<MessageId>) -> Option<&Arc<Message<J>>> {
        self.items
            .front()
            .filter(|head| Some(head.id()) != last_seen && !self.readers.contains(&worker))
    }

    /// Counts `worker`'s read of the head and pops it once the quorum is met.
    /// This is the only path by which a message leaves the queue.
    fn record_read(&mut self, worker: WorkerId) -> bool {
        self.readers.insert(worker);
        self.pop_satisfied() > 0
    }

    /// Pops every head whose readers cover the live set. With no live workers
    /// the quorum is vacuous and the queue drains completely.
    fn pop_satisfied(&mut self) -> usize {
        let mut popped = 0;
        while !self.items.is_empty() && self.live.iter().all(|w| self.readers.contains(w)) {
            self.items.pop_front();
            self.readers.clear();
            self.removed += 1;
            popped += 1;
        }
        popped
    }
}

/// FIFO of pending broadcast messages guarded by a quorum barrier.
pub struct BroadcastQueue<J> {
    state: Mutex<QueueState<J>>,
    /// Signalled when a new head may be readable: on push, pop, and
    /// deregistration.
    available: Condvar,
    /// Signalled when the queue becomes empty with nothing in flight.
    settled: Condvar,
    poll_interval: Duration,
}

impl<J> BroadcastQueue<J> {
    /// Creates an empty queue. Blocked callers re-check their condition at
    /// least every `poll_interval`.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                readers: HashSet::new(),
                live: BTreeSet::new(),
                in_flight: 0,
                removed: 0,
            }),
            available: Condvar::new(),
            settled: Condvar::new(),
            poll_interval,
        }
    }

    /// Adds `worker` to the live set.
    ///
    /// # Errors
    /// Returns [`Error::PoolBusy`] if any message is queued: a reader joining
    /// mid-message would change the quorum for a partially consumed head.
    pub fn register(&self, worker: WorkerId) -> Result<()> {
        let mut state = self.state.lock();
        if !state.items.is_empty() {
            return Err(Error::PoolBusy {
                pending: state.items.len(),
            });
        }
        state.live.insert(worker);
        Ok(())
    }

    /// Removes a terminated worker from the live set and re-evaluates the
    /// barrier for the current head.
    pub fn deregister(&self, worker: WorkerId) {
        let mut state = self.state.lock();
        if state.live.remove(&worker) {
            state.readers.remove(&worker);
            state.pop_satisfied();
            self.notify(&state);
        }
    }

    /// Appends `message` to the tail and wakes every waiting worker. Returns
    /// the queue length after the push.
    pub fn push(&self, message: Message<J>) -> usize {
        let mut state = self.state.lock();
        state.items.push_back(Arc::new(message));
        state.pop_satisfied();
        let len = state.items.len();
        self.notify(&state);
        len
    }

    /// Returns the current head without removing it.
    pub fn peek_head(&self) -> Option<Arc<Message<J>>> {
        self.state.lock().items.front().cloned()
    }

    /// Blocks until the head is a message `worker` has not read yet, then
    /// records the read and hands the message out.
    ///
    /// `last_seen` is the id of the last message this worker consumed. It is
    /// compared against the head while the queue lock is held, together with
    /// the read increment.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn next_for(&self, worker: WorkerId, last_seen: Option<MessageId>) -> Claim<J> {
        let mut state = self.state.lock();
        loop {
            if let Some(head) = state.unread_head(worker, last_seen) {
                let head = Arc::clone(head);
                let own = head.sender().is(worker);
                if !own {
                    state.in_flight += 1;
                }
                if state.record_read(worker) {
                    self.notify(&state);
                }
                return if own {
                    Claim::Acknowledged(head)
                } else {
                    Claim::Dispatch(head)
                };
            }
            self.available.wait_for(&mut state, self.poll_interval);
        }
    }

    /// Marks a dispatch handed out by [`Self::next_for`] as finished.
    pub fn finish_dispatch(&self, _worker: WorkerId) {
        let mut state = self.state.lock();
        debug_assert!(state.in_flight > 0, "finish_dispatch without a claim");
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.is_settled() {
            self.settled.notify_all();
        }
    }

    /// Whether the queue is empty and no dispatch is in flight.
    pub fn is_settled(&self) -> bool {
        self.state.lock().is_settled()
    }

    /// Blocks until [`Self::is_settled`] holds.
    ///
    /// There is no timeout: a live worker that never reads the head keeps this
    /// call blocked.
    pub fn wait_settled(&self) {
        let mut state = self.state.lock();
        while !state.is_settled() {
            self.settled.wait_for(&mut state, self.poll_interval);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Number of workers the barrier currently waits for.
    pub fn live_workers(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Total number of messages that have left the queue.
    pub fn removed(&self) -> u64 {
        self.state.lock().removed
    }

    fn notify(&self, state: &MutexGuard<'_, QueueState<J>>) {
        self.available.notify_all();
        if state.is_settled() {
            self.settled.notify_all();
        }
    }
}

impl<J> core::fmt::Debug for BroadcastQueue<J> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BroadcastQueue")
            .field("pending", &state.items.len())
            .field("readers", &state.readers.len())
            .field("live", &state.live)
            .field("in_flight", &state.in_flight)
            .field("removed", &state.removed)
            .finish()
    }
}
