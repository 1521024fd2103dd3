//! Client side of the gRPC interface, plus conversions between wire and domain types shared with
//! the servers.
mod connect;
mod convert;
mod follower_client;
mod leader_client;

pub use connect::RpcError;
pub use follower_client::FollowerRpcClient;
pub use leader_client::LeaderRpcClient;

pub(crate) use convert::ack_from_proto;
pub(crate) use convert::ack_to_proto;
pub(crate) use convert::epoch_from_proto;
pub(crate) use convert::epoch_to_proto;
pub(crate) use convert::log_entry_from_proto;
pub(crate) use convert::log_entry_to_proto;
pub(crate) use convert::offset_from_proto;
pub(crate) use convert::offset_to_proto;
