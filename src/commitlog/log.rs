use crate::commitlog::{LogEntry, Offset};
use std::io;

/// Log is a node's ordered sequence of entries, indexed by offset.
///
/// Entries `[0, k)` are committed and entries from `k` onward are not. The log never checks this
/// itself; the leader and follower state machines are responsible for keeping it true.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Log {
    entries: Vec<LogEntry>,
}

impl Log {
    pub fn new() -> Self {
        Log { entries: vec![] }
    }

    pub fn from_entries(entries: Vec<LogEntry>) -> Self {
        Log { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// next_offset returns the offset the next appended entry must carry.
    pub fn next_offset(&self) -> Offset {
        Offset::new_usize(self.entries.len())
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn get(&self, offset: Offset) -> Option<&LogEntry> {
        self.entries.get(offset.as_usize())
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    /// Remove the entry at `offset` and everything after it.
    pub fn truncate(&mut self, offset: Offset) {
        self.entries.truncate(offset.as_usize());
    }

    /// Remove the last entry, if any.
    pub fn pop(&mut self) -> Option<LogEntry> {
        self.entries.pop()
    }

    /// Flip the entry at `offset` to committed. Returns false if there is no such entry.
    pub fn mark_committed(&mut self, offset: Offset) -> bool {
        match self.entries.get_mut(offset.as_usize()) {
            Some(entry) => {
                entry.committed = true;
                true
            }
            None => false,
        }
    }

    /// Offset of the last committed entry, scanning backwards from the tail.
    pub fn last_committed_offset(&self) -> Option<Offset> {
        self.entries
            .iter()
            .rposition(|entry| entry.committed)
            .map(Offset::new_usize)
    }

    pub fn has_uncommitted(&self) -> bool {
        self.entries.iter().any(|entry| !entry.committed)
    }

    /// Committed entries at or after `from`, in offset order.
    pub fn committed_from(&self, from: Offset) -> Vec<LogEntry> {
        self.entries
            .iter()
            .skip(from.as_usize())
            .filter(|entry| entry.committed)
            .cloned()
            .collect()
    }

    /// Split into the two persisted collections. Concatenating them restores the log.
    pub fn partition(&self) -> (Vec<LogEntry>, Vec<LogEntry>) {
        self.entries.iter().cloned().partition(|entry| entry.committed)
    }
}

/// LogStore persists a whole [`Log`]. There is no incremental format: every mutation rewrites
/// the full state, and every operation that reads or mutates a log loads it first.
pub trait LogStore: Send + Sync {
    /// Rebuild the log as `committed ++ uncommitted`. A store that has never been written loads
    /// as an empty log.
    fn load(&self) -> Result<Log, LogStoreError>;

    /// Overwrite both collections with the contents of `log`.
    fn save(&self, log: &Log) -> Result<(), LogStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LogStoreError {
    #[error("log store IO failure: {0}")]
    Io(#[from] io::Error),
    #[error("log store has malformed contents: {0}")]
    Serialization(#[from] serde_json::Error),
}
