use crate::commitlog::{Epoch, LogEntry, Offset};
use crate::follower::Ack;
use crate::rpc::RpcError;

/// FollowerClient is the leader's handle on a single follower.
///
/// Implementations should not retry: the leader counts each call as exactly one ack or one
/// failure, and bounds every call with its own timeout.
#[async_trait::async_trait]
pub trait FollowerClient: Clone + Send + Sync + 'static {
    /// Identifies the follower in logs.
    fn id(&self) -> &str;

    async fn replicate_log(&self, entry: LogEntry) -> Result<Ack, RpcError>;

    async fn commit(&self, epoch: Epoch, offset: Offset) -> Result<Ack, RpcError>;
}
