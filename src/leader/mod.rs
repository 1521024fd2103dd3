mod follower_client;
mod leader;
mod leader_api;

pub use follower_client::FollowerClient;
pub use leader::Leader;
pub use leader_api::ReadError;
pub use leader_api::WriteError;
pub use leader_api::WriteStatus;
