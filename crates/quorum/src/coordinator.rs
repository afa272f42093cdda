//! The pool owner and its mining round protocol.
//!
//! A [`Coordinator`] spawns a fixed set of workers at construction, then runs
//! rounds on the caller's thread:
//!
//! 1. **Broadcasting**: one job message is pushed to the broadcast queue.
//! 2. **AwaitingCompletion**: wait until every live worker has dispatched it
//!    and no dispatch is in flight.
//! 3. **Harvesting**: collect responses in arrival order.
//! 4. **Validating**: the first response passing the round's [`Verify`] wins;
//!    the remaining ones passing it are counted as `verified_by`.
//! 5. **Persisting**: the winning record is handed to the [`Store`].
//!
//! Rounds are strictly sequential. Starting a round while an earlier
//! broadcast is still being dispatched, or while its responses are unread,
//! fails with [`Error::ReentrantRound`]. The current phase stays observable
//! from other threads through [`Coordinator::round_state`].

use crate::{
    BroadcastQueue, Error, HandlerRegistry, IdSequence, MemoryStore, Message, MessageId,
    MinedRecord, PoolConfig, Response, ResponseCollector, Result, RoundState, RoundStatus, Sender,
    Store,
    Tagged, Verify, WorkerHandle, WorkerId, WorkerState,
    worker::{Shared, Worker},
};
use parking_lot::Mutex;
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Summary of a successful mining round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundReport<R> {
    /// Id of the broadcast job message.
    pub job: MessageId,
    /// Number of responses harvested for the round.
    pub harvested: usize,
    /// The record handed to the store.
    pub record: MinedRecord<R>,
}

/// Collects handlers and settings before the pool starts.
///
/// Handlers registered here are visible to every worker from its first
/// dispatch on.
pub struct CoordinatorBuilder<J: Tagged, R> {
    config: PoolConfig,
    registry: HandlerRegistry<J, R>,
}

impl<J, R> CoordinatorBuilder<J, R>
where
    J: Tagged + Send + Sync + 'static,
    R: Send + 'static,
{
    pub fn new(config: PoolConfig) -> Self {
        Self {
            registry: HandlerRegistry::new(config.missing_handler),
            config,
        }
    }

    /// Registers `handler` for jobs tagged `tag`, replacing any previous one.
    pub fn handler<F>(self, tag: J::Tag, handler: F) -> Self
    where
        F: Fn(WorkerId, &Message<J>) -> Option<R> + Send + Sync + 'static,
    {
        self.registry.register(tag, handler);
        self
    }

    /// Spawns the pool with an in-memory store.
    ///
    /// # Errors
    /// See [`Self::build_with_store`].
    pub fn build(self) -> Result<Coordinator<J, R>>
    where
        R: Clone,
    {
        self.build_with_store(MemoryStore::new())
    }

    /// Validates the configuration, registers every worker with the queue,
    /// and spawns one thread per worker.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for an unusable configuration, or
    /// [`Error::Spawn`] if a worker thread could not be started. Workers
    /// spawned before the failure are shut down.
    pub fn build_with_store<S>(self, store: S) -> Result<Coordinator<J, R, S>>
    where
        S: Store<R>,
    {
        self.config.validate()?;
        let total_workers = self.config.workers;
        let ids: Vec<WorkerId> = (1..=total_workers)
            .map(|n| {
                u32::try_from(n).map(WorkerId::new).map_err(|_| Error::InvalidConfig {
                    reason: format!("worker id {n} exceeds u32::MAX"),
                })
            })
            .collect::<Result<_>>()?;

        let shared = Arc::new(Shared {
            ids: IdSequence::new(),
            queue: BroadcastQueue::new(self.config.poll_interval),
            collector: ResponseCollector::new(),
            registry: self.registry,
        });
        for &id in &ids {
            shared.queue.register(id)?;
        }

        let mut coordinator = Coordinator {
            shared,
            workers: Vec::with_capacity(total_workers),
            store,
            round: Mutex::new(()),
            state: RoundStatus::default(),
            total_workers,
        };

        for (i, &id) in ids.iter().enumerate() {
            match Worker::new(id, Arc::clone(&coordinator.shared)).spawn() {
                Ok(handle) => coordinator.workers.push(handle),
                Err(e) => {
                    // never started, so they must not hold up the quorum
                    for &unstarted in &ids[i..] {
                        coordinator.shared.queue.deregister(unstarted);
                    }
                    return Err(e);
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Started pool with {total_workers} workers");

        Ok(coordinator)
    }
}

/// Owner of a worker pool and runner of mining rounds.
///
/// Dropping a coordinator tears the pool down as [`Self::shutdown`] does, but
/// discards any worker error.
pub struct Coordinator<J: Tagged, R, S = MemoryStore<R>> {
    shared: Arc<Shared<J, R>>,
    workers: Vec<WorkerHandle>,
    store: S,
    /// Serializes rounds, broadcasts and handler registration.
    round: Mutex<()>,
    state: RoundStatus,
    total_workers: usize,
}

impl<J, R> Coordinator<J, R>
where
    J: Tagged + Send + Sync + 'static,
    R: Send + 'static,
{
    /// Starts building a pool with the given configuration.
    pub fn builder(config: PoolConfig) -> CoordinatorBuilder<J, R> {
        CoordinatorBuilder::new(config)
    }
}

impl<J, R, S> Coordinator<J, R, S>
where
    J: Tagged + Send + Sync + 'static,
    R: Send + 'static,
    S: Store<R>,
{
    /// Runs one mining round for `job` and persists the winning result.
    ///
    /// # Errors
    /// - [`Error::ReentrantRound`] if an earlier broadcast is still being
    ///   dispatched or unread responses remain. Nothing is broadcast and the
    ///   round state is unchanged.
    /// - [`Error::PoolExhausted`] if no worker is alive.
    /// - [`Error::NoValidResponse`] if no harvested response passes
    ///   `verifier`. Nothing is persisted; the pool stays usable.
    /// - [`Error::Store`] if the store rejects the record.
    ///
    /// Blocks without a timeout until every live worker has dispatched the
    /// job.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn mine<V>(&self, job: J, verifier: &V) -> Result<RoundReport<R>>
    where
        V: Verify<R> + ?Sized,
    {
        let _round = self.round.lock();

        // settled first: once the queue is settled every response of an
        // earlier broadcast is already in the collector
        let settled = self.shared.queue.is_settled();
        let pending = self.shared.collector.len();
        if !settled || pending > 0 {
            return Err(Error::ReentrantRound {
                pending: pending + self.shared.queue.len(),
            });
        }

        let previous = self.state.get();
        self.enter(RoundState::Broadcasting);
        let job = match self.push_job(job) {
            Ok(id) => id,
            Err(e) => {
                self.enter(previous);
                return Err(e);
            }
        };

        self.enter(RoundState::AwaitingCompletion);
        self.shared.queue.wait_settled();

        self.enter(RoundState::Harvesting);
        let harvested = self.shared.collector.drain();
        let total = harvested.len();

        self.enter(RoundState::Validating);
        let mut candidates = harvested.into_iter();
        let Some(winner) = candidates.by_ref().find(|r| verifier.verify(r.result())) else {
            #[cfg(feature = "tracing")]
            tracing::warn!("No valid response among {total} for job {job}");
            self.enter(RoundState::Failed);
            return Err(Error::NoValidResponse {
                message: job,
                harvested: total,
            });
        };
        let verified_by = candidates.filter(|r| verifier.verify(r.result())).count();

        self.enter(RoundState::Persisting);
        let record = MinedRecord {
            worker: winner.sender(),
            message: winner.id(),
            result: winner.into_result(),
            verified_by,
            total_workers: self.total_workers,
            mined_at: unix_seconds(),
        };
        if let Err(e) = self.store.save(record.worker, &record) {
            self.enter(RoundState::Failed);
            return Err(e);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Job {job} won by {} (verified by {verified_by} of {} others)",
            record.worker,
            total.saturating_sub(1)
        );

        self.enter(RoundState::Idle);
        Ok(RoundReport {
            job,
            harvested: total,
            record,
        })
    }

    /// Broadcasts `job` to every live worker without waiting for it.
    ///
    /// Responses accumulate in the collector until taken or drained.
    ///
    /// # Errors
    /// Returns [`Error::PoolExhausted`] if no worker is alive.
    pub fn broadcast(&self, job: J) -> Result<MessageId> {
        let _round = self.round.lock();
        self.push_job(job)
    }

    /// Blocks until no worker is running and the broadcast queue is empty.
    ///
    /// There is no timeout: a live worker that stops reading blocks this call
    /// forever.
    pub fn await_completion(&self) {
        self.shared.queue.wait_settled();
    }

    /// Whether no worker is running and the broadcast queue is empty.
    pub fn is_completed(&self) -> bool {
        self.shared.queue.is_settled()
            && self.workers.iter().all(|w| w.state() != WorkerState::Running)
    }

    /// Removes and returns the earliest unread response.
    pub fn take_response(&self) -> Option<Response<R>> {
        self.shared.collector.pop_front()
    }

    /// Removes every unread response, in arrival order.
    pub fn drain_responses(&self) -> Vec<Response<R>> {
        self.shared.collector.drain()
    }

    pub fn pending_responses(&self) -> usize {
        self.shared.collector.len()
    }

    /// Number of messages still waiting for their quorum.
    pub fn pending_messages(&self) -> usize {
        self.shared.queue.len()
    }

    /// Queries persisted records across every worker.
    ///
    /// # Errors
    /// Propagates [`Error::Store`] from the store.
    pub fn find(&self, predicate: &dyn Fn(&MinedRecord<R>) -> bool) -> Result<Vec<MinedRecord<R>>> {
        self.store.find(predicate)
    }

    /// Adds or replaces a handler after the pool has started.
    ///
    /// # Errors
    /// Returns [`Error::PoolBusy`] unless the pool has completed all work, so
    /// that no message is dispatched with a mix of old and new handlers.
    pub fn register_handler<F>(&self, tag: J::Tag, handler: F) -> Result<bool>
    where
        F: Fn(WorkerId, &Message<J>) -> Option<R> + Send + Sync + 'static,
    {
        let _round = self.round.lock();
        if !self.shared.queue.is_settled() {
            return Err(Error::PoolBusy {
                pending: self.shared.queue.len(),
            });
        }
        Ok(self.shared.registry.register(tag, handler))
    }

    /// Current phase of the round protocol. Does not wait for a running
    /// round.
    pub fn round_state(&self) -> RoundState {
        self.state.get()
    }

    pub fn worker_states(&self) -> Vec<(WorkerId, WorkerState)> {
        self.workers.iter().map(|w| (w.id(), w.state())).collect()
    }

    /// Workers still taking part in the quorum.
    pub fn live_workers(&self) -> usize {
        self.shared.queue.live_workers()
    }

    /// Pool size at construction.
    pub const fn total_workers(&self) -> usize {
        self.total_workers
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Tears the pool down. See [`Self::close`].
    ///
    /// # Errors
    /// Returns the first error a worker terminated with.
    pub fn shutdown(mut self) -> Result<()> {
        self.close()
    }

    fn push_job(&self, job: J) -> Result<MessageId> {
        if self.shared.queue.live_workers() == 0 {
            return Err(Error::PoolExhausted);
        }
        let msg = Message::new_job(&self.shared.ids, Sender::Coordinator, job);
        let id = msg.id();
        self.shared.queue.push(msg);
        Ok(id)
    }

    fn enter(&self, next: RoundState) {
        #[cfg(feature = "tracing")]
        tracing::trace!("Round {} -> {next}", self.state.get());
        self.state.set(next);
    }
}

impl<J: Tagged, R, S> Coordinator<J, R, S> {
    /// Workers whose threads have not been joined yet.
    pub fn joinable_workers(&self) -> usize {
        self.workers.iter().filter(|w| w.is_joinable()).count()
    }

    /// Stops every worker and joins its thread, leaving the coordinator
    /// inspectable. Calling it again is a no-op.
    ///
    /// The quit sentinel travels through the same queue and barrier as jobs,
    /// so every queued job is still dispatched first.
    ///
    /// # Errors
    /// Returns the first error a worker terminated with (for instance a
    /// fatal [`Error::MissingHandler`]). All workers are joined regardless.
    pub fn close(&mut self) -> Result<()> {
        if self.joinable_workers() == 0 {
            return Ok(());
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Posting quit to {} live workers",
            self.shared.queue.live_workers()
        );

        self.shared.queue.push(Message::quit(&self.shared.ids));
        self.shared.queue.wait_settled();

        let mut first_err = None;
        for worker in &mut self.workers {
            if let Err(e) = worker.join() {
                #[cfg(feature = "tracing")]
                tracing::error!("{} exited with error: {e}", worker.id());
                first_err.get_or_insert(e);
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Worker pool shutdown complete");

        first_err.map_or(Ok(()), Err)
    }
}

impl<J: Tagged, R, S> Drop for Coordinator<J, R, S> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
