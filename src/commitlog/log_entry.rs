use serde::{Deserialize, Serialize};
use std::fmt;

/// Epoch is the leader-generation marker carried by every entry. Nodes only use it to reject
/// entries from a stale leader; nothing here advances it.
#[derive(Copy, Clone, Default, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(u32);

impl Epoch {
    pub fn new(epoch: u32) -> Self {
        Epoch(epoch)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Offset is the zero-based position of an entry in a node's log. Offsets in an accepted log are
/// dense: the entry at position `i` always has offset `i`.
#[derive(Copy, Clone, Default, PartialOrd, PartialEq, Ord, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Offset(u32);

impl Offset {
    pub fn new(offset: u32) -> Self {
        Offset(offset)
    }

    pub fn new_usize(offset: usize) -> Self {
        Self::new(offset as u32)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }

    pub fn plus(&self, delta: u32) -> Offset {
        Offset::new(self.0 + delta)
    }
}

impl fmt::Debug for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// LogEntry is the unit of replicated state. Everything but `committed` is immutable once the
/// entry exists, and `committed` only ever flips from false to true.
///
/// JSON representation (one element of `committed.json` / `uncommitted.json`):
///
/// ```text
/// { "epoch": 0, "offset": 3, "data": "hello", "committed": true }
/// ```
///
/// Missing fields fall back to their zero value, so files written by tools that omit zero values
/// still load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default)]
    pub epoch: Epoch,
    #[serde(default)]
    pub offset: Offset,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub committed: bool,
}

impl LogEntry {
    pub fn new_uncommitted(epoch: Epoch, offset: Offset, data: String) -> Self {
        LogEntry {
            epoch,
            offset,
            data,
            committed: false,
        }
    }
}
