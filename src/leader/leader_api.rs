use crate::commitlog::LogStoreError;
use crate::rpc::RpcError;
use std::fmt;

const COMMITTED: &str = "committed";
const FAILED_QUORUM: &str = "failed quorum";

/// WriteStatus is the outcome of a write that made it through persistence. A quorum failure is an
/// expected outcome, not an error.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WriteStatus {
    Committed,
    FailedQuorum,
}

impl WriteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteStatus::Committed => COMMITTED,
            WriteStatus::FailedQuorum => FAILED_QUORUM,
        }
    }

    pub fn parse(status: &str) -> Option<Self> {
        match status {
            COMMITTED => Some(WriteStatus::Committed),
            FAILED_QUORUM => Some(WriteStatus::FailedQuorum),
            _ => None,
        }
    }
}

impl fmt::Display for WriteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Failed to persist leader log: {0}")]
    Store(#[from] LogStoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    // Retryable. The leader has a write in flight that might still be rolled back.
    #[error("read denied: uncommitted entries present in log")]
    UncommittedEntriesPresent,

    #[error("Failed to load leader log: {0}")]
    Store(#[from] LogStoreError),

    #[error("Leader read RPC failed: {0}")]
    Rpc(#[from] RpcError),
}
