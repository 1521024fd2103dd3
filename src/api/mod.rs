//! Public entry points for running a node: options, configs and wiring.
mod options;
mod wiring;

pub use options::FollowerOptions;
pub use options::LeaderOptions;
pub use wiring::try_start_follower;
pub use wiring::try_start_leader;
pub use wiring::FollowerConfig;
pub use wiring::FollowerInfo;
pub use wiring::LeaderConfig;
pub use wiring::NodeCreationError;
pub use wiring::NodeHandle;
