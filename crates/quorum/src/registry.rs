use crate::{Error, Message, MissingHandlerPolicy, Result, Tagged, WorkerId};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// A registered message handler.
///
/// Handlers run synchronously on the dispatching worker's thread and return
/// `Some(result)` to emit a response, or `None` to stay silent.
pub type Handler<J, R> = Arc<dyn Fn(WorkerId, &Message<J>) -> Option<R> + Send + Sync>;

/// Dispatch table from a job tag to its [`Handler`].
///
/// The table is read by every worker on every dispatch and written only while
/// the pool is idle. Entries are never removed; registering the same tag
/// again replaces the previous handler.
pub struct HandlerRegistry<J: Tagged, R> {
    handlers: RwLock<HashMap<J::Tag, Handler<J, R>>>,
    policy: MissingHandlerPolicy,
}

impl<J: Tagged, R> HandlerRegistry<J, R> {
    pub fn new(policy: MissingHandlerPolicy) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Adds or replaces the handler for `tag`. Returns `true` if a previous
    /// handler was replaced.
    pub fn register<F>(&self, tag: J::Tag, handler: F) -> bool
    where
        F: Fn(WorkerId, &Message<J>) -> Option<R> + Send + Sync + 'static,
    {
        self.handlers.write().insert(tag, Arc::new(handler)).is_some()
    }

    /// Returns the handler for `tag`.
    ///
    /// # Errors
    /// Returns [`Error::MissingHandler`] if nothing is registered for `tag`.
    /// What the caller does with that is governed by [`Self::policy`].
    pub fn lookup(&self, tag: J::Tag) -> Result<Handler<J, R>> {
        self.handlers
            .read()
            .get(&tag)
            .cloned()
            .ok_or_else(|| Error::MissingHandler {
                tag: format!("{tag:?}"),
            })
    }

    pub fn contains(&self, tag: J::Tag) -> bool {
        self.handlers.read().contains_key(&tag)
    }

    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn policy(&self) -> MissingHandlerPolicy {
        self.policy
    }
}

impl<J: Tagged, R> core::fmt::Debug for HandlerRegistry<J, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let tags: Vec<_> = self.handlers.read().keys().copied().collect();
        f.debug_struct("HandlerRegistry")
            .field("tags", &tags)
            .field("policy", &self.policy)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdSequence, Sender};

    #[derive(Debug)]
    enum Job {
        Double(u64),
        Noop,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum JobTag {
        Double,
        Noop,
    }

    impl Tagged for Job {
        type Tag = JobTag;

        fn tag(&self) -> JobTag {
            match self {
                Job::Double(_) => JobTag::Double,
                Job::Noop => JobTag::Noop,
            }
        }
    }

    #[test]
    fn lookup_returns_registered_handler() {
        let registry = HandlerRegistry::<Job, u64>::new(MissingHandlerPolicy::Ignore);
        registry.register(JobTag::Double, |_, msg| match msg.job()? {
            Job::Double(n) => Some(n * 2),
            Job::Noop => None,
        });

        let ids = IdSequence::new();
        let msg = Message::new_job(&ids, Sender::Coordinator, Job::Double(21));
        let handler = registry.lookup(JobTag::Double).unwrap();
        assert_eq!(handler(WorkerId::new(1), &msg), Some(42));
    }

    #[test]
    fn missing_tag_reports_missing_handler() {
        let registry = HandlerRegistry::<Job, u64>::new(MissingHandlerPolicy::Fatal);
        assert!(!registry.contains(JobTag::Noop));
        match registry.lookup(JobTag::Noop) {
            Err(Error::MissingHandler { tag }) => assert_eq!(tag, "Noop"),
            other => panic!("unexpected lookup result: {:?}", other.map(|_| ())),
        }
        assert_eq!(registry.policy(), MissingHandlerPolicy::Fatal);
    }

    #[test]
    fn registering_again_replaces_the_entry() {
        let registry = HandlerRegistry::<Job, u64>::new(MissingHandlerPolicy::Ignore);
        assert!(!registry.register(JobTag::Noop, |_, _| Some(1)));
        assert!(registry.register(JobTag::Noop, |_, _| Some(2)));
        assert_eq!(registry.len(), 1);

        let ids = IdSequence::new();
        let msg = Message::new_job(&ids, Sender::Coordinator, Job::Noop);
        let handler = registry.lookup(JobTag::Noop).unwrap();
        assert_eq!(handler(WorkerId::new(1), &msg), Some(2));
    }
}
