use crate::follower::ResyncOptions;
use std::convert::TryFrom;
use tokio::time::Duration;

/// Quorum size used when the caller does not pick one.
const DEFAULT_QUORUM_SIZE: usize = 2;

#[derive(Clone, Default)]
pub struct LeaderOptions {
    /// Follower acks required in each phase of a write. Defaults to 2.
    pub quorum_size: Option<usize>,
    /// Bound on each follower call. Defaults to 5s.
    pub rpc_timeout: Option<Duration>,
}

pub(super) struct LeaderOptionsValidated {
    pub(super) quorum_size: usize,
    pub(super) rpc_timeout: Duration,
}

impl LeaderOptionsValidated {
    pub(super) fn try_new(options: LeaderOptions, num_followers: usize) -> Result<Self, String> {
        let values = LeaderOptionsValidated {
            quorum_size: options.quorum_size.unwrap_or(DEFAULT_QUORUM_SIZE),
            rpc_timeout: options.rpc_timeout.unwrap_or(Duration::from_secs(5)),
        };

        if values.quorum_size < 1 || values.quorum_size > num_followers {
            return Err(format!(
                "Quorum size must be in [1, {}] for {} followers, got {}",
                num_followers, num_followers, values.quorum_size
            ));
        }
        if values.rpc_timeout == Duration::from_secs(0) {
            return Err("RPC timeout must be non-zero".to_string());
        }

        Ok(values)
    }
}

#[derive(Clone, Default)]
pub struct FollowerOptions {
    /// Wait between resync attempts refused by the leader. Defaults to 100ms.
    pub resync_backoff: Option<Duration>,
    /// Leader reads per resync before giving up. Defaults to 10.
    pub resync_max_attempts: Option<u32>,
    /// Bound on each leader read. Defaults to 5s.
    pub rpc_timeout: Option<Duration>,
}

impl TryFrom<FollowerOptions> for ResyncOptions {
    type Error = String;

    fn try_from(options: FollowerOptions) -> Result<Self, Self::Error> {
        let defaults = ResyncOptions::default();
        let values = ResyncOptions {
            backoff: options.resync_backoff.unwrap_or(defaults.backoff),
            max_attempts: options.resync_max_attempts.unwrap_or(defaults.max_attempts),
            rpc_timeout: options.rpc_timeout.unwrap_or(defaults.rpc_timeout),
        };

        if values.max_attempts == 0 {
            return Err("Resync must be allowed at least 1 attempt".to_string());
        }
        if values.rpc_timeout == Duration::from_secs(0) {
            return Err("RPC timeout must be non-zero".to_string());
        }

        Ok(values)
    }
}
