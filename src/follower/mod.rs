mod follower;
mod follower_api;
mod leader_client;
mod resync;

pub use follower::Follower;
pub use follower_api::Ack;
pub use follower_api::CommitError;
pub use follower_api::ReplicateError;
pub use leader_client::LeaderClient;
pub use resync::ResyncOptions;
