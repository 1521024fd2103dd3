mod follower_server;
mod leader_server;
mod shutdown;

pub use follower_server::FollowerRpcServer;
pub use leader_server::LeaderRpcServer;
pub use shutdown::shutdown_signal;
pub use shutdown::RpcServerShutdownHandle;
pub use shutdown::RpcServerShutdownSignal;
