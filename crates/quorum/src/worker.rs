use crate::{
    Body, BroadcastQueue, Claim, Error, HandlerRegistry, IdSequence, Message, MessageId,
    MissingHandlerPolicy, Response, ResponseCollector, Result, Tagged, WorkerId, WorkerState,
    WorkerStatus,
};
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
};

/// State shared by a coordinator and all of its workers.
pub(crate) struct Shared<J: Tagged, R> {
    pub(crate) ids: IdSequence,
    pub(crate) queue: BroadcastQueue<J>,
    pub(crate) collector: ResponseCollector<R>,
    pub(crate) registry: HandlerRegistry<J, R>,
}

/// Outcome of dispatching one message.
enum Step {
    Continue,
    Stop,
}

/// One pool slot: a dedicated thread draining the broadcast queue.
///
/// The worker claims each head it has not read yet, looks up the handler for
/// the head's tag, runs it synchronously, and submits any result to the
/// response collector. It exits on the quit sentinel, on a missing handler
/// when the policy says so, or when a response is rejected.
pub(crate) struct Worker<J: Tagged, R> {
    id: WorkerId,
    status: Arc<WorkerStatus>,
    shared: Arc<Shared<J, R>>,
}

impl<J, R> Worker<J, R>
where
    J: Tagged + Send + Sync + 'static,
    R: Send + 'static,
{
    pub(crate) fn new(id: WorkerId, shared: Arc<Shared<J, R>>) -> Self {
        Self {
            id,
            status: Arc::new(WorkerStatus::default()),
            shared,
        }
    }

    /// Starts the worker on its own named thread.
    ///
    /// # Errors
    /// Returns [`Error::Spawn`] if the OS refuses to create the thread.
    pub(crate) fn spawn(self) -> Result<WorkerHandle> {
        let id = self.id;
        let status = Arc::clone(&self.status);
        let thread = thread::Builder::new()
            .name(format!("quorum-worker-{}", id.get()))
            .spawn(move || self.run())?;
        Ok(WorkerHandle {
            id,
            status,
            thread: Some(thread),
        })
    }

    fn run(self) -> Result<()> {
        #[cfg(feature = "tracing")]
        tracing::trace!("{} started", self.id);

        let _departure = Departure {
            id: self.id,
            status: &self.status,
            queue: &self.shared.queue,
        };
        let outcome = self.serve();

        #[cfg(feature = "tracing")]
        match &outcome {
            Ok(()) => tracing::debug!("{} stopped", self.id),
            Err(e) => tracing::error!("{} terminated: {e}", self.id),
        }
        outcome
    }

    fn serve(&self) -> Result<()> {
        // id of the last message consumed, compared against the head under
        // the queue lock
        let mut last_seen: Option<MessageId> = None;
        loop {
            let claim = self.shared.queue.next_for(self.id, last_seen);
            last_seen = Some(claim.message().id());

            let msg = match claim {
                Claim::Dispatch(msg) => msg,
                Claim::Acknowledged(_) => continue,
            };

            // quit goes straight from Waiting to Terminated
            if msg.is_quit() {
                self.status.transition(WorkerState::Terminated);
                self.shared.queue.finish_dispatch(self.id);
                return Ok(());
            }

            let step = {
                let _dispatch = InFlight {
                    id: self.id,
                    status: &self.status,
                    queue: &self.shared.queue,
                };
                self.status.transition(WorkerState::Running);
                self.dispatch(&msg)
            };

            match step? {
                Step::Continue => {}
                Step::Stop => return Ok(()),
            }
        }
    }

    fn dispatch(&self, msg: &Message<J>) -> Result<Step> {
        let tag = match msg.body() {
            Body::Quit => return Ok(Step::Stop),
            Body::Job(job) => job.tag(),
        };

        let handler = match self.shared.registry.lookup(tag) {
            Ok(handler) => handler,
            Err(err) => return self.on_missing_handler(msg, err),
        };

        if let Some(result) = handler(self.id, msg) {
            let response = Response::new(&self.shared.ids, self.id, msg.id(), result);
            self.shared.collector.submit(self.id, response)?;
        }
        Ok(Step::Continue)
    }

    fn on_missing_handler(&self, _msg: &Message<J>, err: Error) -> Result<Step> {
        match self.shared.registry.policy() {
            MissingHandlerPolicy::Ignore => {
                #[cfg(feature = "tracing")]
                tracing::debug!("{} ignoring {}: {err}", self.id, _msg.id());
                Ok(Step::Continue)
            }
            MissingHandlerPolicy::TerminateWorker => {
                #[cfg(feature = "tracing")]
                tracing::warn!("{} stopping on {}: {err}", self.id, _msg.id());
                Ok(Step::Stop)
            }
            MissingHandlerPolicy::Fatal => Err(err),
        }
    }
}

/// Ends a dispatch on drop, even if the handler panicked, so the coordinator
/// never waits on a dispatch that can no longer finish.
struct InFlight<'a, J> {
    id: WorkerId,
    status: &'a WorkerStatus,
    queue: &'a BroadcastQueue<J>,
}

impl<J> Drop for InFlight<'_, J> {
    fn drop(&mut self) {
        self.status.transition(WorkerState::Waiting);
        self.queue.finish_dispatch(self.id);
    }
}

/// Terminates the worker and leaves the quorum on drop.
struct Departure<'a, J> {
    id: WorkerId,
    status: &'a WorkerStatus,
    queue: &'a BroadcastQueue<J>,
}

impl<J> Drop for Departure<'_, J> {
    fn drop(&mut self) {
        self.status.transition(WorkerState::Terminated);
        self.queue.deregister(self.id);
    }
}

/// The coordinator's handle on a running worker thread.
#[derive(Debug)]
pub struct WorkerHandle {
    id: WorkerId,
    status: Arc<WorkerStatus>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl WorkerHandle {
    pub const fn id(&self) -> WorkerId {
        self.id
    }

    pub fn state(&self) -> WorkerState {
        self.status.get()
    }

    /// Whether the thread has not been joined yet.
    pub fn is_joinable(&self) -> bool {
        self.thread.is_some()
    }

    /// Waits for the worker thread to exit and returns how it ended. Joining
    /// an already joined worker returns `Ok(())`.
    ///
    /// # Errors
    /// Returns the error the worker terminated with, or
    /// [`Error::WorkerPanicked`] if its thread panicked.
    pub fn join(&mut self) -> Result<()> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .unwrap_or(Err(Error::WorkerPanicked { worker: self.id })),
            None => Ok(()),
        }
    }
}
