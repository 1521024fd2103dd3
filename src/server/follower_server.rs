use crate::commitlog::LogStore;
use crate::follower::{Ack, CommitError, Follower, LeaderClient, ReplicateError};
use crate::grpc::grpc_replica_server::{GrpcReplica, GrpcReplicaServer};
use crate::grpc::{ProtoAck, ProtoCommitReq, ProtoLogEntry};
use crate::rpc::{ack_to_proto, epoch_from_proto, log_entry_from_proto, offset_from_proto};
use crate::server::RpcServerShutdownSignal;
use std::net::SocketAddr;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// FollowerRpcServer exposes a [`Follower`] over gRPC.
pub struct FollowerRpcServer<S, L>
where
    S: LogStore,
    L: LeaderClient,
{
    logger: slog::Logger,
    follower: Follower<S, L>,
}

impl<S, L> FollowerRpcServer<S, L>
where
    S: LogStore + 'static,
    L: LeaderClient,
{
    pub fn new(logger: slog::Logger, follower: Follower<S, L>) -> Self {
        FollowerRpcServer { logger, follower }
    }

    pub async fn run(self, socket_addr: SocketAddr, shutdown_signal: RpcServerShutdownSignal) {
        let logger = self.logger.clone();
        slog::info!(logger, "Follower server listening on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(GrpcReplicaServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal)
            .await;

        slog::info!(logger, "Server run() has exited: {:?}", result);
    }

    async fn handle_replicate_log(&self, rpc_request: ProtoLogEntry) -> Result<ProtoAck, Status> {
        let entry = log_entry_from_proto(rpc_request)?;
        let app_result = self.follower.replicate_log(entry).await;
        Self::convert_replicate_result(app_result)
    }

    fn convert_replicate_result(app_result: Result<Ack, ReplicateError>) -> Result<ProtoAck, Status> {
        match app_result {
            Ok(ack) => Ok(ack_to_proto(ack)),
            Err(ReplicateError::Store(e)) => Err(Status::internal(format!("Local IO failure: {}", e))),
        }
    }

    async fn handle_commit(&self, rpc_request: ProtoCommitReq) -> Result<ProtoAck, Status> {
        let epoch = epoch_from_proto(rpc_request.epoch)?;
        let offset = offset_from_proto(rpc_request.offset)?;
        let app_result = self.follower.commit(epoch, offset).await;
        Self::convert_commit_result(app_result)
    }

    fn convert_commit_result(app_result: Result<Ack, CommitError>) -> Result<ProtoAck, Status> {
        match app_result {
            Ok(ack) => Ok(ack_to_proto(ack)),
            Err(CommitError::Store(e)) => Err(Status::internal(format!("Local IO failure: {}", e))),
        }
    }
}

#[async_trait::async_trait]
impl<S, L> GrpcReplica for FollowerRpcServer<S, L>
where
    S: LogStore + 'static,
    L: LeaderClient,
{
    async fn replicate_log(&self, rpc_request_wrapped: Request<ProtoLogEntry>) -> Result<Response<ProtoAck>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_replicate_log(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn commit(&self, rpc_request_wrapped: Request<ProtoCommitReq>) -> Result<Response<ProtoAck>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_commit(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }
}
