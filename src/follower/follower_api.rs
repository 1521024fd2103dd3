use crate::commitlog::LogStoreError;

pub(crate) const ACK_OK: &str = "ok";
pub(crate) const ACK_COMMITTED: &str = "committed";
pub(crate) const ACK_STALE_EPOCH: &str = "stale epoch";
pub(crate) const ACK_SYNC_STARTED: &str = "sync started";
pub(crate) const ACK_NOT_FOUND: &str = "not found";

/// Ack is a follower's answer to the leader. Only `success` is load-bearing; `message` is for
/// humans reading logs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ack {
    pub success: bool,
    pub message: String,
}

impl Ack {
    pub(crate) fn accepted(message: &str) -> Self {
        Ack {
            success: true,
            message: message.to_string(),
        }
    }

    pub(crate) fn rejected(message: &str) -> Self {
        Ack {
            success: false,
            message: message.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicateError {
    #[error("Failed to load or persist follower log: {0}")]
    Store(#[from] LogStoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("Failed to load or persist follower log: {0}")]
    Store(#[from] LogStoreError),
}
