use crate::commitlog::{LogEntry, Offset};
use crate::leader::ReadError;

/// LeaderClient is how a follower pulls committed entries it is missing.
#[async_trait::async_trait]
pub trait LeaderClient: Send + Sync + 'static {
    /// Committed entries at or after `from`. Must map a leader-side refusal because of
    /// uncommitted entries to [`ReadError::UncommittedEntriesPresent`]; the follower retries that
    /// case only.
    async fn read(&self, from: Offset) -> Result<Vec<LogEntry>, ReadError>;
}
