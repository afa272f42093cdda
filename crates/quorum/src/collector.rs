use crate::{Error, Response, Result, WorkerId};
use parking_lot::Mutex;
use std::collections::VecDeque;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Ordered buffer of worker responses, drained by the coordinator.
///
/// The collector has its own lock, independent of the broadcast queue's, so a
/// worker doing quorum bookkeeping never blocks another worker submitting a
/// response.
#[derive(Debug)]
pub struct ResponseCollector<R> {
    responses: Mutex<VecDeque<Response<R>>>,
}

impl<R> ResponseCollector<R> {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
        }
    }

    /// Appends a response produced by `emitter`.
    ///
    /// # Errors
    /// Returns [`Error::SenderMismatch`] if the response claims a different
    /// sender than the worker submitting it. The response is dropped.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, response)))]
    pub fn submit(&self, emitter: WorkerId, response: Response<R>) -> Result<()> {
        if response.sender() != emitter {
            return Err(Error::SenderMismatch {
                expected: emitter,
                actual: response.sender(),
            });
        }
        self.responses.lock().push_back(response);
        Ok(())
    }

    /// Removes and returns the earliest response.
    pub fn pop_front(&self) -> Option<Response<R>> {
        self.responses.lock().pop_front()
    }

    /// Removes every buffered response, in arrival order.
    pub fn drain(&self) -> Vec<Response<R>> {
        self.responses.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.responses.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.lock().is_empty()
    }
}

impl<R> Default for ResponseCollector<R> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IdSequence, MessageId};

    #[test]
    fn responses_come_out_in_arrival_order() {
        let ids = IdSequence::new();
        let collector = ResponseCollector::new();
        let job = MessageId::from_raw(1);

        for worker in [3, 1, 2] {
            let w = WorkerId::new(worker);
            collector
                .submit(w, Response::new(&ids, w, job, worker))
                .unwrap();
        }

        assert_eq!(collector.len(), 3);
        assert_eq!(collector.pop_front().map(Response::into_result), Some(3));
        let rest: Vec<_> = collector.drain().into_iter().map(Response::into_result).collect();
        assert_eq!(rest, vec![1, 2]);
        assert!(collector.is_empty());
    }

    #[test]
    fn mismatched_sender_is_rejected() {
        let ids = IdSequence::new();
        let collector = ResponseCollector::new();
        let forged = Response::new(&ids, WorkerId::new(2), MessageId::from_raw(1), "x");

        match collector.submit(WorkerId::new(1), forged) {
            Err(Error::SenderMismatch { expected, actual }) => {
                assert_eq!(expected, WorkerId::new(1));
                assert_eq!(actual, WorkerId::new(2));
            }
            other => panic!("expected SenderMismatch, got {other:?}"),
        }
        assert!(collector.is_empty());
    }
}
