//! Error types for the broadcast pool and the mining round protocol.
//!
//! Per-round failures ([`Error::NoValidResponse`], an ignored
//! [`Error::MissingHandler`]) leave the pool usable. Usage errors
//! ([`Error::ReentrantRound`], [`Error::SenderMismatch`], [`Error::PoolBusy`])
//! are returned synchronously to the caller. A fatal missing handler only
//! terminates the worker that hit it and is reported again from
//! [`Coordinator::shutdown`].
//!
//! A stalled quorum is not an error: a worker that stops reading
//! while items are outstanding blocks [`Coordinator::await_completion`]
//! forever.
//!
//! [`Coordinator::shutdown`]: crate::Coordinator::shutdown
//! [`Coordinator::await_completion`]: crate::Coordinator::await_completion

use crate::{MessageId, WorkerId};

/// A result type defaulting to the crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Boxed error raised by a [`Store`](crate::Store) implementation.
pub type StoreSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All errors the pool and coordinator can produce.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// No handler is registered for the dispatched message's tag.
    #[error("no handler registered for message tag {tag}")]
    MissingHandler { tag: String },

    /// A response was submitted by a worker other than its sender.
    #[error("response sender {actual} does not match emitting worker {expected}")]
    SenderMismatch { expected: WorkerId, actual: WorkerId },

    /// A mining round was requested while responses from an earlier round
    /// were still unread.
    #[error("{pending} unread responses remain; drain them before starting a new round")]
    ReentrantRound { pending: usize },

    /// Every harvested response failed the round's integrity check.
    #[error("none of the {harvested} harvested responses for message {message} passed verification")]
    NoValidResponse { message: MessageId, harvested: usize },

    /// The worker set can only change while the broadcast queue is empty.
    #[error("cannot change the worker set while {pending} messages are queued")]
    PoolBusy { pending: usize },

    /// A message was broadcast to a pool without live workers.
    #[error("no live workers remain to receive the broadcast")]
    PoolExhausted,

    /// The pool configuration was rejected.
    #[error("invalid pool configuration: {reason}")]
    InvalidConfig { reason: String },

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// A worker thread panicked and could not be joined cleanly.
    #[error("worker {worker} panicked")]
    WorkerPanicked { worker: WorkerId },

    /// The persistence collaborator failed.
    #[error("store error: {0}")]
    Store(#[source] StoreSource),
}

impl Error {
    /// Wraps any persistence failure into [`Error::Store`].
    pub fn store<E>(err: E) -> Self
    where
        E: Into<StoreSource>,
    {
        Self::Store(err.into())
    }
}
