use crate::{IdSequence, MessageId, Sender, WorkerId};
use core::{fmt, hash::Hash};

/// Maps a job value to the discriminator used for handler dispatch.
///
/// Implement this for the enum of job kinds a pool understands; the
/// associated `Tag` is typically a field-less mirror of that enum.
///
/// # Example
/// ```
/// use quorum::Tagged;
///
/// #[derive(Debug)]
/// enum Job {
///     Echo(String),
///     Square(u64),
/// }
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// enum JobTag {
///     Echo,
///     Square,
/// }
///
/// impl Tagged for Job {
///     type Tag = JobTag;
///
///     fn tag(&self) -> JobTag {
///         match self {
///             Job::Echo(_) => JobTag::Echo,
///             Job::Square(_) => JobTag::Square,
///         }
///     }
/// }
///
/// assert_eq!(Job::Square(3).tag(), JobTag::Square);
/// ```
pub trait Tagged {
    type Tag: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn tag(&self) -> Self::Tag;
}

/// Discriminator of a [`Message`]: a job kind, or the reserved quit sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag<T> {
    Job(T),
    Quit,
}

/// Payload of a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body<J> {
    Job(J),
    /// Terminates every worker that dispatches it.
    Quit,
}

/// An immutable unit of communication broadcast to every worker.
///
/// Messages are shared between worker threads as `Arc<Message<J>>` and are
/// never mutated after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message<J> {
    id: MessageId,
    sender: Sender,
    body: Body<J>,
}

impl<J> Message<J> {
    /// Builds a job message with an id drawn from `ids`.
    pub fn new_job(ids: &IdSequence, sender: Sender, job: J) -> Self {
        Self::from_parts(ids.next_id(), sender, Body::Job(job))
    }

    /// Builds the quit sentinel. It is always coordinator-authored.
    pub fn quit(ids: &IdSequence) -> Self {
        Self::from_parts(ids.next_id(), Sender::Coordinator, Body::Quit)
    }

    pub(crate) const fn from_parts(id: MessageId, sender: Sender, body: Body<J>) -> Self {
        Self { id, sender, body }
    }

    pub const fn id(&self) -> MessageId {
        self.id
    }

    pub const fn sender(&self) -> Sender {
        self.sender
    }

    pub const fn body(&self) -> &Body<J> {
        &self.body
    }

    /// Returns the job carried by this message, or `None` for the quit
    /// sentinel.
    pub const fn job(&self) -> Option<&J> {
        match &self.body {
            Body::Job(job) => Some(job),
            Body::Quit => None,
        }
    }

    pub const fn is_quit(&self) -> bool {
        matches!(self.body, Body::Quit)
    }
}

impl<J: Tagged> Message<J> {
    pub fn tag(&self) -> Tag<J::Tag> {
        match &self.body {
            Body::Job(job) => Tag::Job(job.tag()),
            Body::Quit => Tag::Quit,
        }
    }
}

/// A worker's answer to a dispatched [`Message`].
///
/// A response carries its own [`MessageId`] from the same sequence as the
/// message it answers, so ids stay unique across both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response<R> {
    id: MessageId,
    sender: WorkerId,
    reply_to: MessageId,
    result: R,
}

impl<R> Response<R> {
    pub fn new(ids: &IdSequence, sender: WorkerId, reply_to: MessageId, result: R) -> Self {
        Self {
            id: ids.next_id(),
            sender,
            reply_to,
            result,
        }
    }

    pub const fn id(&self) -> MessageId {
        self.id
    }

    pub const fn sender(&self) -> WorkerId {
        self.sender
    }

    /// Id of the message this response answers.
    pub const fn reply_to(&self) -> MessageId {
        self.reply_to
    }

    pub const fn result(&self) -> &R {
        &self.result
    }

    pub fn into_result(self) -> R {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Ping;

    impl Tagged for Ping {
        type Tag = &'static str;

        fn tag(&self) -> Self::Tag {
            "ping"
        }
    }

    #[test]
    fn job_and_quit_messages_carry_their_tag() {
        let ids = IdSequence::new();
        let job = Message::new_job(&ids, Sender::Coordinator, Ping);
        let quit = Message::<Ping>::quit(&ids);

        assert_eq!(job.tag(), Tag::Job("ping"));
        assert_eq!(job.job(), Some(&Ping));
        assert!(!job.is_quit());

        assert_eq!(quit.tag(), Tag::Quit);
        assert_eq!(quit.job(), None);
        assert_eq!(quit.sender(), Sender::Coordinator);
        assert!(job.id() < quit.id());
    }

    #[test]
    fn responses_share_the_message_id_space() {
        let ids = IdSequence::new();
        let msg = Message::new_job(&ids, Sender::Coordinator, Ping);
        let resp = Response::new(&ids, WorkerId::new(3), msg.id(), 42_u64);

        assert!(resp.id() > msg.id());
        assert_eq!(resp.reply_to(), msg.id());
        assert_eq!(resp.sender(), WorkerId::new(3));
        assert_eq!(resp.into_result(), 42);
    }
}
