use crate::commitlog::{Epoch, Log, LogEntry, LogStore, Offset};
use crate::follower::Ack;
use crate::leader::{FollowerClient, ReadError, WriteError, WriteStatus};
use crate::rpc::RpcError;
use tokio::sync::Mutex;
use tokio::time::error::Elapsed;
use tokio::time::Duration;

/// Leader is the single writer of the replicated log.
///
/// A write is a two-phase quorum round: replicate the new entry to every follower, then ask every
/// follower to commit it. Each phase is a full barrier over all followers, so its latency is the
/// slowest follower's (bounded by `rpc_timeout`). Writes are serialized by `write_lock`; reads are
/// not, and rely on the "no uncommitted entries" gate instead.
pub struct Leader<S, F>
where
    S: LogStore,
    F: FollowerClient,
{
    logger: slog::Logger,
    epoch: Epoch,
    quorum_size: usize,
    rpc_timeout: Duration,
    store: S,
    followers: Vec<F>,
    write_lock: Mutex<()>,
}

#[derive(Copy, Clone, Debug)]
enum Phase {
    Replicate,
    Commit,
}

impl<S, F> Leader<S, F>
where
    S: LogStore + 'static,
    F: FollowerClient,
{
    /// `quorum_size` must already be validated against `followers.len()`.
    pub fn new(
        logger: slog::Logger,
        epoch: Epoch,
        store: S,
        followers: Vec<F>,
        quorum_size: usize,
        rpc_timeout: Duration,
    ) -> Self {
        Leader {
            logger,
            epoch,
            quorum_size,
            rpc_timeout,
            store,
            followers,
            write_lock: Mutex::new(()),
        }
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn quorum_size(&self) -> usize {
        self.quorum_size
    }

    /// Current length of the persisted log, including an in-flight uncommitted entry.
    pub fn log_len(&self) -> Result<usize, WriteError> {
        Ok(self.store.load()?.len())
    }

    /// Drops an uncommitted tail left behind by a crash mid-write. Only meaningful at boot, when no
    /// write can be in flight; otherwise reads would stay refused until someone cleaned it up.
    /// Returns the number of entries dropped.
    pub async fn recover(&self) -> Result<usize, WriteError> {
        let _write_guard = self.write_lock.lock().await;

        let mut log = self.store.load()?;
        let committed_len = match log.last_committed_offset() {
            Some(last_committed) => last_committed.plus(1),
            None => Offset::new(0),
        };
        let num_dropped = log.len() - committed_len.as_usize();
        if num_dropped == 0 {
            slog::info!(self.logger, "Recovered log with {} committed entries", log.len());
            return Ok(0);
        }

        log.truncate(committed_len);
        self.store.save(&log)?;
        slog::warn!(
            self.logger,
            "Dropped {} uncommitted entries left by an interrupted write, log length now {}",
            num_dropped,
            log.len()
        );

        Ok(num_dropped)
    }

    pub async fn write(&self, data: String) -> Result<WriteStatus, WriteError> {
        slog::info!(self.logger, "Received write request: data={:?}", data);
        let _write_guard = self.write_lock.lock().await;

        let mut log = self.store.load()?;

        // Persist before replicating, so a crash mid-write leaves a visible uncommitted entry.
        let entry = LogEntry::new_uncommitted(self.epoch, log.next_offset(), data);
        log.append(entry.clone());
        self.store.save(&log)?;
        slog::info!(
            self.logger,
            "Appended uncommitted log entry: offset={:?}, data={:?}",
            entry.offset,
            entry.data
        );

        let acks = self.run_phase(Phase::Replicate, &entry).await;
        if acks < self.quorum_size {
            slog::error!(self.logger, "Replication quorum FAILED: {}/{}", acks, self.quorum_size);
            return self.roll_back(log);
        }
        slog::info!(self.logger, "Replication quorum achieved: {}/{}", acks, self.quorum_size);

        let acks = self.run_phase(Phase::Commit, &entry).await;
        if acks < self.quorum_size {
            slog::error!(self.logger, "Commit quorum FAILED: {}/{}", acks, self.quorum_size);
            return self.roll_back(log);
        }
        slog::info!(self.logger, "Commit quorum achieved: {}/{}", acks, self.quorum_size);

        log.mark_committed(entry.offset);
        self.store.save(&log)?;
        slog::info!(
            self.logger,
            "Entry COMMITTED: offset={:?}, data={:?}",
            entry.offset,
            entry.data
        );

        Ok(WriteStatus::Committed)
    }

    // Followers that accepted the entry keep it as an uncommitted tail. Their next replication
    // attempt truncates it.
    fn roll_back(&self, mut log: Log) -> Result<WriteStatus, WriteError> {
        if let Some(dropped) = log.pop() {
            slog::warn!(self.logger, "Rolled back uncommitted entry at offset {:?}", dropped.offset);
        }
        self.store.save(&log)?;

        Ok(WriteStatus::FailedQuorum)
    }

    /// Committed entries at or after `from`. Refused outright while any entry in the log, at any
    /// offset, is still uncommitted.
    pub fn read(&self, from: Offset) -> Result<Vec<LogEntry>, ReadError> {
        let log = self.store.load()?;

        if log.has_uncommitted() {
            slog::warn!(self.logger, "Read request denied: uncommitted entries present in log");
            return Err(ReadError::UncommittedEntriesPresent);
        }

        slog::info!(self.logger, "Received read request from offset={:?}", from);
        let entries = log.committed_from(from);
        slog::info!(self.logger, "Returning {} committed entries", entries.len());

        Ok(entries)
    }

    /// Calls every follower concurrently and waits for all of them. Returns the number of acks.
    async fn run_phase(&self, phase: Phase, entry: &LogEntry) -> usize {
        let mut calls = Vec::with_capacity(self.followers.len());
        for follower in self.followers.iter() {
            calls.push(tokio::task::spawn(Self::call_follower(
                self.logger.clone(),
                follower.clone(),
                phase,
                entry.clone(),
                self.rpc_timeout,
            )));
        }

        let mut acks = 0;
        for call in calls {
            match call.await {
                Ok(true) => acks += 1,
                Ok(false) => {}
                Err(join_error) => {
                    slog::error!(self.logger, "{:?} task for a follower died: {:?}", phase, join_error);
                }
            }
        }

        acks
    }

    async fn call_follower(
        logger: slog::Logger,
        follower: F,
        phase: Phase,
        entry: LogEntry,
        rpc_timeout: Duration,
    ) -> bool {
        let logger = logger.new(slog::o!(
            "Follower" => follower.id().to_string(),
            "Offset" => entry.offset.as_u32()
        ));

        let rpc_reply = match phase {
            Phase::Replicate => {
                let offset = entry.offset;
                slog::debug!(logger, "ClientWire - ReplicateLog offset={:?}", offset);
                tokio::time::timeout(rpc_timeout, follower.replicate_log(entry)).await
            }
            Phase::Commit => {
                slog::debug!(logger, "ClientWire - Commit offset={:?}", entry.offset);
                tokio::time::timeout(rpc_timeout, follower.commit(entry.epoch, entry.offset)).await
            }
        };
        slog::debug!(logger, "ClientWire - {:?}", rpc_reply);

        Self::log_follower_reply(&logger, phase, rpc_reply)
    }

    fn log_follower_reply(
        logger: &slog::Logger,
        phase: Phase,
        rpc_reply: Result<Result<Ack, RpcError>, Elapsed>,
    ) -> bool {
        match rpc_reply {
            Ok(Ok(ack)) if ack.success => {
                slog::info!(logger, "{:?} succeeded", phase);
                true
            }
            Ok(Ok(ack)) => {
                slog::warn!(logger, "{:?} rejected by follower: {}", phase, ack.message);
                false
            }
            Ok(Err(rpc_error)) => {
                slog::error!(logger, "{:?} FAILED: {}", phase, rpc_error);
                false
            }
            Err(_timeout) => {
                slog::error!(logger, "{:?} FAILED: timed out", phase);
                false
            }
        }
    }
}
