use chrono::Utc;
use clap::{Parser, Subcommand};
use quorum_log::{
    FollowerConfig, FollowerInfo, FollowerOptions, LeaderConfig, LeaderOptions, LeaderRpcClient, NodeHandle, Offset,
    WriteStatus,
};
use slog::Drain;
use std::error::Error;
use std::fs::{self, OpenOptions};
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use tokio::time::Duration;

const FOLLOWER_PORT_BASE: u16 = 50050;

#[derive(Parser)]
#[command(name = "quorum-log", about = "Primary-backup replicated log with quorum writes")]
struct Cli {
    /// Also write logs to a timestamped file under this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the leader.
    Leader {
        #[arg(long, default_value = "0.0.0.0:50040")]
        listen: SocketAddr,
        #[arg(long, default_value = "data/leader")]
        data_dir: PathBuf,
        #[arg(long, default_value = "0")]
        epoch: u32,
        #[arg(long, default_value = "2")]
        quorum: usize,
        #[arg(long, default_value = "5000")]
        rpc_timeout_ms: u64,
        /// Follower address, repeatable. Defaults to localhost:50051..=50053.
        #[arg(long = "follower")]
        followers: Vec<String>,
    },
    /// Run follower `n`, listening on port 50050+n.
    Follower {
        n: u16,
        #[arg(long, default_value = "http://localhost:50040")]
        leader: String,
        #[arg(long, default_value = "./data")]
        data_root: PathBuf,
    },
    /// Append `data` through the leader.
    Write {
        data: String,
        #[arg(long, default_value = "http://localhost:50040")]
        leader: String,
    },
    /// Print committed entries from `offset` onwards.
    Read {
        #[arg(long, default_value = "0")]
        offset: u32,
        #[arg(long, default_value = "http://localhost:50040")]
        leader: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Leader {
            listen,
            data_dir,
            epoch,
            quorum,
            rpc_timeout_ms,
            followers,
        } => {
            let info_logger = create_root_logger(cli.log_dir, "leader")?;
            let followers = if followers.is_empty() {
                (1..=3)
                    .map(|n| format!("localhost:{}", FOLLOWER_PORT_BASE + n))
                    .collect()
            } else {
                followers
            };
            let config = LeaderConfig {
                epoch,
                listen_addr: listen,
                data_dir,
                followers: followers
                    .into_iter()
                    .map(|addr| FollowerInfo {
                        replica_id: addr.clone(),
                        addr,
                    })
                    .collect(),
                info_logger,
                options: LeaderOptions {
                    quorum_size: Some(quorum),
                    rpc_timeout: Some(Duration::from_millis(rpc_timeout_ms)),
                },
            };
            let node = quorum_log::try_start_leader(config).await?;
            run_until_ctrl_c(node).await
        }
        Command::Follower { n, leader, data_root } => {
            let replica_id = format!("replica_{}", n);
            let port = FOLLOWER_PORT_BASE
                .checked_add(n)
                .ok_or_else(|| format!("Follower number {} is out of range", n))?;
            let info_logger = create_root_logger(cli.log_dir, &replica_id)?;
            let config = FollowerConfig {
                listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
                data_dir: data_root.join(&replica_id),
                replica_id,
                leader_addr: leader,
                info_logger,
                options: FollowerOptions::default(),
            };
            let node = quorum_log::try_start_follower(config).await?;
            run_until_ctrl_c(node).await
        }
        Command::Write { data, leader } => {
            let client = LeaderRpcClient::new(&leader, Duration::from_secs(30))?;
            let status = client.write(data).await?;
            println!("Write result: {}", status);
            match status {
                WriteStatus::Committed => Ok(()),
                WriteStatus::FailedQuorum => Err(status.to_string().into()),
            }
        }
        Command::Read { offset, leader } => {
            let client = LeaderRpcClient::new(&leader, Duration::from_secs(30))?;
            let entries = client.read(Offset::new(offset)).await?;
            println!("Read {} entries from offset {}:", entries.len(), offset);
            for entry in entries {
                println!(
                    "  [epoch={:?} offset={:?} committed={}] {}",
                    entry.epoch, entry.offset, entry.committed, entry.data
                );
            }
            Ok(())
        }
    }
}

async fn run_until_ctrl_c(node: NodeHandle) -> Result<(), Box<dyn Error>> {
    tokio::signal::ctrl_c().await?;
    node.shutdown().await;
    Ok(())
}

fn create_root_logger(log_dir: Option<PathBuf>, node_id: &str) -> Result<slog::Logger, Box<dyn Error>> {
    match log_dir {
        Some(log_dir) => create_root_logger_for_file(log_dir, node_id),
        None => Ok(create_root_logger_for_stdout(node_id)),
    }
}

fn create_root_logger_for_file(log_dir: PathBuf, node_id: &str) -> Result<slog::Logger, Box<dyn Error>> {
    let now = Utc::now().format("%Y-%m-%dT%H-%M-%SZ");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join(format!("{}_{}_info.log", node_id, now));
    let file = OpenOptions::new().create(true).write(true).truncate(true).open(log_path)?;

    let decorator = slog_term::PlainDecorator::new(file);
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    Ok(slog::Logger::root(drain, slog::o!("Node" => node_id.to_string())))
}

fn create_root_logger_for_stdout(node_id: &str) -> slog::Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).use_file_location().build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();

    slog::Logger::root(drain, slog::o!("Node" => node_id.to_string()))
}
