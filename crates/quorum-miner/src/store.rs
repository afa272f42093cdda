use crate::puzzle::Outcome;
use quorum::{MinedRecord, Store, WorkerId};
use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed record at {path}:{line}: {source}")]
    Json {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Append-only JSON Lines storage, one file per worker.
///
/// Worker `n` writes to `<dir>/process-<n>.jsonl`, one [`MinedRecord`] per
/// line. Queries read every `*.jsonl` file in the directory.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    /// Opens the store at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(StoreError::io(&dir))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the records of `worker`.
    pub fn partition(&self, worker: WorkerId) -> PathBuf {
        self.dir.join(format!("process-{}.jsonl", worker.get()))
    }

    fn append(&self, worker: WorkerId, record: &MinedRecord<Outcome>) -> Result<(), StoreError> {
        let path = self.partition(worker);
        let mut line = serde_json::to_vec(record).map_err(|source| StoreError::Json {
            path: path.clone(),
            line: 0,
            source,
        })?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(StoreError::io(&path))?;
        file.write_all(&line).map_err(StoreError::io(&path))?;
        Ok(())
    }

    /// Partition files sorted by name.
    fn partitions(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(StoreError::io(&self.dir))? {
            let path = entry.map_err(StoreError::io(&self.dir))?.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    fn scan(
        &self,
        predicate: &dyn Fn(&MinedRecord<Outcome>) -> bool,
    ) -> Result<Vec<MinedRecord<Outcome>>, StoreError> {
        let mut found = Vec::new();
        for path in self.partitions()? {
            let reader = BufReader::new(File::open(&path).map_err(StoreError::io(&path))?);
            for (i, line) in reader.lines().enumerate() {
                let line = line.map_err(StoreError::io(&path))?;
                if line.trim().is_empty() {
                    continue;
                }
                let record: MinedRecord<Outcome> =
                    serde_json::from_str(&line).map_err(|source| StoreError::Json {
                        path: path.clone(),
                        line: i + 1,
                        source,
                    })?;
                if predicate(&record) {
                    found.push(record);
                }
            }
        }
        Ok(found)
    }
}

impl Store<Outcome> for JsonlStore {
    fn save(&self, worker: WorkerId, record: &MinedRecord<Outcome>) -> quorum::Result<()> {
        self.append(worker, record).map_err(quorum::Error::store)
    }

    fn find(
        &self,
        predicate: &dyn Fn(&MinedRecord<Outcome>) -> bool,
    ) -> quorum::Result<Vec<MinedRecord<Outcome>>> {
        self.scan(predicate).map_err(quorum::Error::store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use quorum::MessageId;

    fn record(worker: u32, msg: &str) -> MinedRecord<Outcome> {
        let mut block = Block::new(worker.to_string(), "tester", msg);
        block.seal(block.digest(1), 1);
        MinedRecord {
            worker: WorkerId::new(worker),
            message: MessageId::from_raw(u64::from(worker)),
            result: Outcome::Block(block),
            verified_by: 2,
            total_workers: 3,
            mined_at: 1_700_000_000,
        }
    }

    #[test]
    fn records_are_appended_per_worker() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::open(dir.path().join("blocks")).unwrap();

        for (worker, msg) in [(1, "a"), (2, "b"), (1, "c")] {
            let r = record(worker, msg);
            store.save(r.worker, &r).unwrap();
        }

        let first = fs::read_to_string(store.partition(WorkerId::new(1))).unwrap();
        assert_eq!(first.lines().count(), 2);
        assert!(store.partition(WorkerId::new(2)).ends_with("process-2.jsonl"));

        let all: Vec<_> = store
            .find(&|_| true)
            .unwrap()
            .into_iter()
            .map(|r| match r.result {
                Outcome::Block(block) => (r.worker.get(), block.msg),
                other => panic!("unexpected outcome {other:?}"),
            })
            .collect();
        assert_eq!(all, vec![(1, "a".into()), (1, "c".into()), (2, "b".into())]);
    }

    #[test]
    fn find_filters_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        for worker in 1..=3 {
            let r = record(worker, "same");
            store.save(r.worker, &r).unwrap();
        }

        let found = store.find(&|r| r.worker.get() >= 2).unwrap();
        assert_eq!(found.len(), 2);
        assert!(store.find(&|r| r.verified_by > 2).unwrap().is_empty());
    }

    #[test]
    fn corrupt_lines_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::open(dir.path()).unwrap();
        let r = record(1, "ok");
        store.save(r.worker, &r).unwrap();
        fs::write(store.dir().join("process-9.jsonl"), "{not json}\n").unwrap();

        match store.scan(&|_| true) {
            Err(StoreError::Json { line, .. }) => assert_eq!(line, 1),
            other => panic!("expected a JSON error, got {other:?}"),
        }
        assert!(matches!(store.find(&|_| true), Err(quorum::Error::Store(_))));
    }
}
