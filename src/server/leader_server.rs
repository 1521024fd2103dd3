use crate::commitlog::{LogEntry, LogStore};
use crate::grpc::grpc_leader_server::{GrpcLeader, GrpcLeaderServer};
use crate::grpc::{ProtoReadReq, ProtoReadResult, ProtoWriteReq, ProtoWriteResult};
use crate::leader::{FollowerClient, Leader, ReadError, WriteError, WriteStatus};
use crate::rpc::{log_entry_to_proto, offset_from_proto};
use crate::server::RpcServerShutdownSignal;
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

/// LeaderRpcServer exposes a [`Leader`] over gRPC.
pub struct LeaderRpcServer<S, F>
where
    S: LogStore,
    F: FollowerClient,
{
    logger: slog::Logger,
    leader: Arc<Leader<S, F>>,
}

impl<S, F> LeaderRpcServer<S, F>
where
    S: LogStore + 'static,
    F: FollowerClient,
{
    pub fn new(logger: slog::Logger, leader: Arc<Leader<S, F>>) -> Self {
        LeaderRpcServer { logger, leader }
    }

    pub async fn run(self, socket_addr: SocketAddr, shutdown_signal: RpcServerShutdownSignal) {
        let logger = self.logger.clone();
        slog::info!(logger, "Leader server listening on '{:?}'", socket_addr);

        let result = Server::builder()
            .add_service(GrpcLeaderServer::new(self))
            .serve_with_shutdown(socket_addr, shutdown_signal)
            .await;

        slog::info!(logger, "Server run() has exited: {:?}", result);
    }

    async fn handle_write(&self, rpc_request: ProtoWriteReq) -> Result<ProtoWriteResult, Status> {
        let app_result = self.leader.write(rpc_request.data).await;
        Self::convert_write_result(app_result)
    }

    fn convert_write_result(app_result: Result<WriteStatus, WriteError>) -> Result<ProtoWriteResult, Status> {
        match app_result {
            Ok(status) => Ok(ProtoWriteResult {
                status: status.as_str().to_string(),
            }),
            Err(WriteError::Store(e)) => Err(Status::internal(format!("Local IO failure: {}", e))),
        }
    }

    fn handle_read(&self, rpc_request: ProtoReadReq) -> Result<ProtoReadResult, Status> {
        let from = offset_from_proto(rpc_request.offset)?;
        let app_result = self.leader.read(from);
        Self::convert_read_result(app_result)
    }

    fn convert_read_result(app_result: Result<Vec<LogEntry>, ReadError>) -> Result<ProtoReadResult, Status> {
        match app_result {
            Ok(entries) => Ok(ProtoReadResult {
                entries: entries
                    .into_iter()
                    .map(log_entry_to_proto)
                    .collect::<Result<_, _>>()
                    .map_err(|e| Status::internal(e.to_string()))?,
            }),
            Err(e @ ReadError::UncommittedEntriesPresent) => Err(Status::failed_precondition(e.to_string())),
            Err(ReadError::Store(e)) => Err(Status::internal(format!("Local IO failure: {}", e))),
            // A leader never reads through RPC itself.
            Err(ReadError::Rpc(e)) => Err(Status::internal(e.to_string())),
        }
    }
}

#[async_trait::async_trait]
impl<S, F> GrpcLeader for LeaderRpcServer<S, F>
where
    S: LogStore + 'static,
    F: FollowerClient,
{
    async fn write(&self, rpc_request_wrapped: Request<ProtoWriteReq>) -> Result<Response<ProtoWriteResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_write(rpc_request).await;
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }

    async fn read(&self, rpc_request_wrapped: Request<ProtoReadReq>) -> Result<Response<ProtoReadResult>, Status> {
        let rpc_request = rpc_request_wrapped.into_inner();

        slog::debug!(self.logger, "ServerWire - {:?}", rpc_request);
        let rpc_result = self.handle_read(rpc_request);
        slog::debug!(self.logger, "ServerWire - {:?}", rpc_result);

        rpc_result.map(Response::new)
    }
}
