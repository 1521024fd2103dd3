mod api;
mod commitlog;
mod follower;
mod leader;
mod rpc;
mod server;
#[cfg(test)]
mod test_utils;
mod grpc {
    include!("../generated/replication.rs");
}

pub use api::try_start_follower;
pub use api::try_start_leader;
pub use api::FollowerConfig;
pub use api::FollowerInfo;
pub use api::FollowerOptions;
pub use api::LeaderConfig;
pub use api::LeaderOptions;
pub use api::NodeCreationError;
pub use api::NodeHandle;
pub use commitlog::Epoch;
pub use commitlog::InMemoryStore;
pub use commitlog::JsonFileStore;
pub use commitlog::Log;
pub use commitlog::LogEntry;
pub use commitlog::LogStore;
pub use commitlog::LogStoreError;
pub use commitlog::Offset;
pub use follower::Ack;
pub use follower::CommitError;
pub use follower::Follower;
pub use follower::LeaderClient;
pub use follower::ReplicateError;
pub use follower::ResyncOptions;
pub use leader::FollowerClient;
pub use leader::Leader;
pub use leader::ReadError;
pub use leader::WriteError;
pub use leader::WriteStatus;
pub use rpc::FollowerRpcClient;
pub use rpc::LeaderRpcClient;
pub use rpc::RpcError;
pub use server::shutdown_signal;
pub use server::FollowerRpcServer;
pub use server::LeaderRpcServer;
pub use server::RpcServerShutdownHandle;
pub use server::RpcServerShutdownSignal;
