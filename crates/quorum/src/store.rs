use crate::{MessageId, Result, WorkerId};
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// The enriched result of a successful mining round.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub struct MinedRecord<R> {
    /// The worker whose response won the round.
    pub worker: WorkerId,
    /// Id of the winning response.
    pub message: MessageId,
    pub result: R,
    /// How many other harvested responses also passed verification.
    pub verified_by: usize,
    /// Pool size when the round ran.
    pub total_workers: usize,
    /// Seconds since the Unix epoch at which the record was persisted.
    pub mined_at: u64,
}

/// Persistence and query collaborator for mined records.
///
/// Storage is append-only and partitioned by worker: every record is saved
/// under the identity of the worker that produced it. Queries span all
/// partitions and never sit on the round's hot path.
pub trait Store<R> {
    /// Appends `record` to the partition of `worker`.
    ///
    /// # Errors
    /// Returns [`Error::Store`](crate::Error::Store) if the record could not
    /// be written.
    fn save(&self, worker: WorkerId, record: &MinedRecord<R>) -> Result<()>;

    /// Returns every stored record matching `predicate`, ordered by worker and
    /// then by insertion.
    ///
    /// # Errors
    /// Returns [`Error::Store`](crate::Error::Store) if stored records could
    /// not be read back.
    fn find(&self, predicate: &dyn Fn(&MinedRecord<R>) -> bool) -> Result<Vec<MinedRecord<R>>>;
}

/// A [`Store`] keeping records in memory, one vector per worker.
#[derive(Debug)]
pub struct MemoryStore<R> {
    partitions: Mutex<BTreeMap<WorkerId, Vec<MinedRecord<R>>>>,
}

impl<R> MemoryStore<R> {
    pub fn new() -> Self {
        Self {
            partitions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Total number of records across all workers.
    pub fn len(&self) -> usize {
        self.partitions.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Clone> Store<R> for MemoryStore<R> {
    fn save(&self, worker: WorkerId, record: &MinedRecord<R>) -> Result<()> {
        self.partitions
            .lock()
            .entry(worker)
            .or_default()
            .push(record.clone());
        Ok(())
    }

    fn find(&self, predicate: &dyn Fn(&MinedRecord<R>) -> bool) -> Result<Vec<MinedRecord<R>>> {
        Ok(self
            .partitions
            .lock()
            .values()
            .flatten()
            .filter(|record| predicate(record))
            .cloned()
            .collect())
    }
}

impl<R, S> Store<R> for std::sync::Arc<S>
where
    S: Store<R> + ?Sized,
{
    fn save(&self, worker: WorkerId, record: &MinedRecord<R>) -> Result<()> {
        (**self).save(worker, record)
    }

    fn find(&self, predicate: &dyn Fn(&MinedRecord<R>) -> bool) -> Result<Vec<MinedRecord<R>>> {
        (**self).find(predicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(worker: u32, result: u64) -> MinedRecord<u64> {
        MinedRecord {
            worker: WorkerId::new(worker),
            message: MessageId::from_raw(u64::from(worker) * 100 + result),
            result,
            verified_by: 0,
            total_workers: 3,
            mined_at: 0,
        }
    }

    #[test]
    fn find_spans_every_worker_partition() {
        let store = MemoryStore::new();
        for (worker, result) in [(2, 20), (1, 10), (2, 21), (3, 30)] {
            let r = record(worker, result);
            store.save(r.worker, &r).unwrap();
        }

        assert_eq!(store.len(), 4);

        let all: Vec<_> = store
            .find(&|_| true)
            .unwrap()
            .into_iter()
            .map(|r| r.result)
            .collect();
        assert_eq!(all, vec![10, 20, 21, 30]);

        let even = store.find(&|r| r.result % 2 == 0).unwrap();
        assert_eq!(even.len(), 3);
    }
}
