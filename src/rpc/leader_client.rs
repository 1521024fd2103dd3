use crate::commitlog::{LogEntry, Offset};
use crate::follower::LeaderClient;
use crate::grpc::grpc_leader_client::GrpcLeaderClient;
use crate::grpc::{ProtoReadReq, ProtoWriteReq};
use crate::leader::{ReadError, WriteStatus};
use crate::rpc::connect::{lazy_channel, RpcError};
use crate::rpc::{log_entry_from_proto, offset_to_proto};
use tokio::time::Duration;
use tonic::transport::Channel;
use tonic::Code;

/// LeaderRpcClient talks to the leader's gRPC interface. Followers use it to catch up; the CLI
/// uses it to write and read.
#[derive(Clone)]
pub struct LeaderRpcClient {
    inner: GrpcLeaderClient<Channel>,
}

impl LeaderRpcClient {
    pub fn new(addr: &str, rpc_timeout: Duration) -> Result<Self, RpcError> {
        let channel = lazy_channel(addr, rpc_timeout)?;

        Ok(LeaderRpcClient {
            inner: GrpcLeaderClient::new(channel),
        })
    }

    pub async fn write(&self, data: String) -> Result<WriteStatus, RpcError> {
        let mut client = self.inner.clone();
        let rpc_reply = client.write(ProtoWriteReq { data }).await?.into_inner();

        WriteStatus::parse(&rpc_reply.status)
            .ok_or_else(|| RpcError::MalformedReply(format!("Unknown write status {:?}", rpc_reply.status)))
    }

    pub async fn read(&self, from: Offset) -> Result<Vec<LogEntry>, ReadError> {
        let rpc_request = ProtoReadReq {
            offset: offset_to_proto(from)?,
        };
        let mut client = self.inner.clone();
        let rpc_reply = client
            .read(rpc_request)
            .await
            .map_err(Self::convert_read_status)?
            .into_inner();

        rpc_reply
            .entries
            .into_iter()
            .map(|proto_entry| {
                log_entry_from_proto(proto_entry).map_err(|status| {
                    ReadError::Rpc(RpcError::MalformedReply(status.message().to_string()))
                })
            })
            .collect()
    }

    // The leader signals "uncommitted entries present" with FAILED_PRECONDITION. Everything else
    // is opaque to us.
    fn convert_read_status(status: tonic::Status) -> ReadError {
        match status.code() {
            Code::FailedPrecondition => ReadError::UncommittedEntriesPresent,
            _ => ReadError::Rpc(RpcError::Status(status)),
        }
    }
}

#[async_trait::async_trait]
impl LeaderClient for LeaderRpcClient {
    async fn read(&self, from: Offset) -> Result<Vec<LogEntry>, ReadError> {
        LeaderRpcClient::read(self, from).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_precondition_means_uncommitted_entries() {
        let status = tonic::Status::failed_precondition("anything at all");

        assert!(matches!(
            LeaderRpcClient::convert_read_status(status),
            ReadError::UncommittedEntriesPresent
        ));
    }

    #[test]
    fn other_codes_are_opaque_rpc_failures() {
        // Same text the leader uses, wrong code: must not be treated as retryable.
        let status = tonic::Status::unknown("read denied: uncommitted entries present in log");

        assert!(matches!(
            LeaderRpcClient::convert_read_status(status),
            ReadError::Rpc(RpcError::Status(_))
        ));
    }
}
