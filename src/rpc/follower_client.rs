use crate::commitlog::{Epoch, LogEntry, Offset};
use crate::follower::Ack;
use crate::grpc::grpc_replica_client::GrpcReplicaClient;
use crate::grpc::ProtoCommitReq;
use crate::leader::FollowerClient;
use crate::rpc::connect::{lazy_channel, RpcError};
use crate::rpc::{ack_from_proto, epoch_to_proto, log_entry_to_proto, offset_to_proto};
use tokio::time::Duration;
use tonic::transport::Channel;

/// FollowerRpcClient is the leader's gRPC stub for one follower.
#[derive(Clone)]
pub struct FollowerRpcClient {
    id: String,
    inner: GrpcReplicaClient<Channel>,
}

impl FollowerRpcClient {
    pub fn new(id: String, addr: &str, rpc_timeout: Duration) -> Result<Self, RpcError> {
        let channel = lazy_channel(addr, rpc_timeout)?;

        Ok(FollowerRpcClient {
            id,
            inner: GrpcReplicaClient::new(channel),
        })
    }
}

#[async_trait::async_trait]
impl FollowerClient for FollowerRpcClient {
    fn id(&self) -> &str {
        &self.id
    }

    async fn replicate_log(&self, entry: LogEntry) -> Result<Ack, RpcError> {
        // Stubs are cheap to clone and need `&mut self` per call.
        let mut client = self.inner.clone();
        let rpc_reply = client.replicate_log(log_entry_to_proto(entry)?).await?;

        Ok(ack_from_proto(rpc_reply.into_inner()))
    }

    async fn commit(&self, epoch: Epoch, offset: Offset) -> Result<Ack, RpcError> {
        let rpc_request = ProtoCommitReq {
            epoch: epoch_to_proto(epoch)?,
            offset: offset_to_proto(offset)?,
        };
        let mut client = self.inner.clone();
        let rpc_reply = client.commit(rpc_request).await?;

        Ok(ack_from_proto(rpc_reply.into_inner()))
    }
}
