use crate::api::options::LeaderOptionsValidated;
use crate::api::{FollowerOptions, LeaderOptions};
use crate::commitlog::{Epoch, JsonFileStore, LogStore, LogStoreError};
use crate::follower::{Follower, ResyncOptions};
use crate::leader::{Leader, WriteError};
use crate::rpc::{FollowerRpcClient, LeaderRpcClient, RpcError};
use crate::server::{self, FollowerRpcServer, LeaderRpcServer, RpcServerShutdownHandle};
use std::convert::TryFrom;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct FollowerInfo {
    pub replica_id: String,
    /// `host:port` or a full `http://host:port` URI.
    pub addr: String,
}

pub struct LeaderConfig {
    pub epoch: u32,
    pub listen_addr: SocketAddr,
    // Node-specific directory holding committed.json and uncommitted.json.
    pub data_dir: PathBuf,
    pub followers: Vec<FollowerInfo>,
    pub info_logger: slog::Logger,
    pub options: LeaderOptions,
}

pub struct FollowerConfig {
    pub replica_id: String,
    pub listen_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub leader_addr: String,
    pub info_logger: slog::Logger,
    pub options: FollowerOptions,
}

#[derive(Debug, thiserror::Error)]
pub enum NodeCreationError {
    #[error("Illegal options for configuring node: {0}")]
    IllegalOptions(String),
    #[error("Log initialization failure: {0}")]
    LogInitialization(#[from] LogStoreError),
    #[error("Invalid peer: {0}")]
    InvalidPeer(#[from] RpcError),
}

impl From<WriteError> for NodeCreationError {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::Store(e) => NodeCreationError::LogInitialization(e),
        }
    }
}

/// NodeHandle owns a running node's RPC server and, for a follower, its background sync.
/// Dropping it stops both.
pub struct NodeHandle {
    shutdown_handle: Option<RpcServerShutdownHandle>,
    server_task: Option<JoinHandle<()>>,
    follower: Option<Follower<JsonFileStore, LeaderRpcClient>>,
}

impl NodeHandle {
    fn new(
        shutdown_handle: RpcServerShutdownHandle,
        server_task: JoinHandle<()>,
        follower: Option<Follower<JsonFileStore, LeaderRpcClient>>,
    ) -> Self {
        NodeHandle {
            shutdown_handle: Some(shutdown_handle),
            server_task: Some(server_task),
            follower,
        }
    }

    /// Stops the node and waits for the server to release its port.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(server_task) = self.server_task.take() {
            let _ = server_task.await;
        }
    }

    fn stop(&mut self) {
        if let Some(follower) = self.follower.take() {
            follower.shutdown();
        }
        if let Some(shutdown_handle) = self.shutdown_handle.take() {
            shutdown_handle.shutdown();
        }
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub async fn try_start_leader(config: LeaderConfig) -> Result<NodeHandle, NodeCreationError> {
    let logger = config.info_logger.new(slog::o!("Role" => "leader"));

    let epoch = validate_epoch(config.epoch).map_err(NodeCreationError::IllegalOptions)?;
    let options = LeaderOptionsValidated::try_new(config.options, config.followers.len())
        .map_err(NodeCreationError::IllegalOptions)?;

    let store = JsonFileStore::create(config.data_dir)?;

    let mut followers = Vec::with_capacity(config.followers.len());
    for follower_info in config.followers {
        slog::info!(
            logger,
            "Registering follower {} at {}",
            follower_info.replica_id,
            follower_info.addr
        );
        followers.push(FollowerRpcClient::new(
            follower_info.replica_id,
            &follower_info.addr,
            options.rpc_timeout,
        )?);
    }

    let leader = Arc::new(Leader::new(
        logger.clone(),
        epoch,
        store,
        followers,
        options.quorum_size,
        options.rpc_timeout,
    ));
    leader.recover().await?;

    let (shutdown_handle, shutdown_signal) = server::shutdown_signal();
    let leader_server = LeaderRpcServer::new(logger, leader);
    let server_task = tokio::spawn(leader_server.run(config.listen_addr, shutdown_signal));

    Ok(NodeHandle::new(shutdown_handle, server_task, None))
}

// Epochs travel as int32.
fn validate_epoch(epoch: u32) -> Result<Epoch, String> {
    if epoch > i32::MAX as u32 {
        return Err(format!("Epoch must be at most {}, got {}", i32::MAX, epoch));
    }
    Ok(Epoch::new(epoch))
}

pub async fn try_start_follower(config: FollowerConfig) -> Result<NodeHandle, NodeCreationError> {
    let logger = config
        .info_logger
        .new(slog::o!("Role" => "follower", "Replica" => config.replica_id.clone()));

    let resync_options = ResyncOptions::try_from(config.options).map_err(NodeCreationError::IllegalOptions)?;

    let store = JsonFileStore::create(config.data_dir)?;
    let recovered = store.load()?;
    slog::info!(
        logger,
        "Loaded log from {:?}: {} entries",
        store.directory(),
        recovered.len()
    );

    let leader = LeaderRpcClient::new(&config.leader_addr, resync_options.rpc_timeout)?;
    let follower = Follower::new(logger.clone(), store, leader, resync_options);

    let (shutdown_handle, shutdown_signal) = server::shutdown_signal();
    let follower_server = FollowerRpcServer::new(logger, follower.clone());
    let server_task = tokio::spawn(follower_server.run(config.listen_addr, shutdown_signal));

    Ok(NodeHandle::new(shutdown_handle, server_task, Some(follower)))
}
