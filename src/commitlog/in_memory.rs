use crate::commitlog::{Log, LogStore, LogStoreError};
use std::sync::Mutex;

// Keeps the same committed/uncommitted split as the file store so reloads behave identically,
// including reordering if a caller ever interleaves the two.
pub struct InMemoryStore {
    partitions: Mutex<Partitions>,
}

#[derive(Default)]
struct Partitions {
    committed: Log,
    uncommitted: Log,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            partitions: Mutex::new(Partitions::default()),
        }
    }

    pub fn with_log(log: &Log) -> Self {
        let store = Self::new();
        store.write(log);
        store
    }

    fn write(&self, log: &Log) {
        let (committed, uncommitted) = log.partition();
        let mut partitions = self.partitions.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        partitions.committed = Log::from_entries(committed);
        partitions.uncommitted = Log::from_entries(uncommitted);
    }
}

impl LogStore for InMemoryStore {
    fn load(&self) -> Result<Log, LogStoreError> {
        let partitions = self.partitions.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut entries = partitions.committed.entries().to_vec();
        entries.extend_from_slice(partitions.uncommitted.entries());

        Ok(Log::from_entries(entries))
    }

    fn save(&self, log: &Log) -> Result<(), LogStoreError> {
        self.write(log);
        Ok(())
    }
}
