use crate::commitlog::{Epoch, Log, LogEntry, LogStore, LogStoreError, Offset};
use crate::follower::follower_api::{ACK_COMMITTED, ACK_NOT_FOUND, ACK_OK, ACK_STALE_EPOCH, ACK_SYNC_STARTED};
use crate::follower::resync::{CancelFlag, ResyncDecision, ResyncError, ResyncTicket, ResyncTracker};
use crate::follower::{Ack, CommitError, LeaderClient, ReplicateError, ResyncOptions};
use crate::leader::ReadError;
use std::sync::{Arc, MutexGuard};
use tokio::sync::Mutex;

/// Follower mirrors the leader's log.
///
/// Replication, commit and background resync all mutate the same log. Each of them holds `state`
/// for its whole load-decide-persist critical section, so there is exactly one writer to the
/// in-memory log and the on-disk files at any time.
///
/// Cloning is cheap; all clones share the same state.
pub struct Follower<S, L>
where
    S: LogStore,
    L: LeaderClient,
{
    shared: Arc<Shared<S, L>>,
}

struct Shared<S, L> {
    logger: slog::Logger,
    store: S,
    leader: L,
    state: Mutex<FollowerState>,
    resync_tracker: std::sync::Mutex<ResyncTracker>,
    resync_options: ResyncOptions,
}

struct FollowerState {
    epoch: Epoch,
    log: Log,
}

impl<S, L> Clone for Follower<S, L>
where
    S: LogStore,
    L: LeaderClient,
{
    fn clone(&self) -> Self {
        Follower {
            shared: self.shared.clone(),
        }
    }
}

impl<S, L> Follower<S, L>
where
    S: LogStore + 'static,
    L: LeaderClient,
{
    pub fn new(logger: slog::Logger, store: S, leader: L, resync_options: ResyncOptions) -> Self {
        Follower {
            shared: Arc::new(Shared {
                logger,
                store,
                leader,
                state: Mutex::new(FollowerState {
                    epoch: Epoch::new(0),
                    log: Log::new(),
                }),
                resync_tracker: std::sync::Mutex::new(ResyncTracker::new()),
                resync_options,
            }),
        }
    }

    pub async fn epoch(&self) -> Epoch {
        self.shared.state.lock().await.epoch
    }

    /// Snapshot of the persisted log, taken under the state lock.
    pub async fn log(&self) -> Result<Log, LogStoreError> {
        let _state = self.shared.state.lock().await;
        self.shared.store.load()
    }

    /// Start offset of the in-flight background resync, if any.
    pub fn resync_in_flight(&self) -> Option<Offset> {
        self.resync_tracker().in_flight_from()
    }

    /// Cancels the background resync and stops new ones from starting. Replication and commit
    /// keep working; a stopped follower just never catches up on its own.
    pub fn shutdown(&self) {
        if let Some(cancelled_from) = self.resync_tracker().close() {
            slog::info!(self.shared.logger, "Cancelled background sync from offset {:?}", cancelled_from);
        }
    }

    pub async fn replicate_log(&self, entry: LogEntry) -> Result<Ack, ReplicateError> {
        let logger = &self.shared.logger;
        let mut state = self.shared.state.lock().await;
        state.log = self.shared.store.load()?;

        slog::info!(
            logger,
            "Received REPLICATE request: offset={:?}, data={:?}, epoch={:?}",
            entry.offset,
            entry.data,
            entry.epoch
        );

        if entry.epoch < state.epoch {
            slog::warn!(
                logger,
                "Received STALE epoch (entry: {:?}, local: {:?}), ignoring entry",
                entry.epoch,
                state.epoch
            );
            return Ok(Ack::rejected(ACK_STALE_EPOCH));
        }

        // A previous replication left an uncommitted tail. Drop back to the committed prefix.
        // The incoming entry is never appended in the same call; the leader's next attempt is.
        if matches!(state.log.last(), Some(last) if !last.committed) {
            slog::warn!(logger, "Uncommitted log entries detected");

            let resume_from = match state.log.last_committed_offset() {
                Some(last_committed) => last_committed.plus(1),
                None => Offset::new(0),
            };
            state.log.truncate(resume_from);
            self.shared.store.save(&state.log)?;
            slog::warn!(logger, "Truncated log to committed prefix, length now {:?}", resume_from);

            if entry.offset != resume_from {
                slog::warn!(
                    logger,
                    "Offset mismatch (got {:?}, expected {:?}), starting background sync",
                    entry.offset,
                    resume_from
                );
                self.start_resync(resume_from);
            }

            return Ok(Ack::rejected(ACK_SYNC_STARTED));
        }

        let next_offset = state.log.next_offset();
        if entry.offset != next_offset {
            slog::warn!(
                logger,
                "Conflict detected: expected offset {:?}, got {:?}",
                next_offset,
                entry.offset
            );

            if entry.offset < next_offset {
                // Ahead of the leader. Rejected even though the truncation may be all that was
                // needed; the leader's next attempt at this offset is accepted.
                state.log.truncate(entry.offset);
                self.shared.store.save(&state.log)?;
                slog::warn!(logger, "Follower log is ahead of leader, truncated to offset {:?}", entry.offset);
            } else {
                slog::warn!(logger, "Follower log is behind leader");
                self.start_resync(next_offset);
            }

            return Ok(Ack::rejected(ACK_SYNC_STARTED));
        }

        state.epoch = entry.epoch;
        let accepted = LogEntry {
            committed: false,
            ..entry
        };
        slog::info!(
            logger,
            "Saved uncommitted log entry: offset={:?}, data={:?}",
            accepted.offset,
            accepted.data
        );
        state.log.append(accepted);
        self.shared.store.save(&state.log)?;

        Ok(Ack::accepted(ACK_OK))
    }

    // `epoch` is only logged; the commit applies to whatever entry sits at `offset`.
    pub async fn commit(&self, epoch: Epoch, offset: Offset) -> Result<Ack, CommitError> {
        let logger = &self.shared.logger;
        let mut state = self.shared.state.lock().await;
        state.log = self.shared.store.load()?;

        if !state.log.mark_committed(offset) {
            slog::error!(logger, "Commit failed: offset {:?} not found in log (epoch {:?})", offset, epoch);
            return Ok(Ack::rejected(ACK_NOT_FOUND));
        }

        self.shared.store.save(&state.log)?;
        slog::info!(logger, "Entry COMMITTED at offset {:?} (epoch {:?})", offset, epoch);

        Ok(Ack::accepted(ACK_COMMITTED))
    }

    fn resync_tracker(&self) -> MutexGuard<'_, ResyncTracker> {
        // The tracker is never left half-updated, so a poisoned lock is still usable.
        self.shared
            .resync_tracker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start_resync(&self, from: Offset) {
        let logger = &self.shared.logger;

        let ticket = match self.resync_tracker().request(from) {
            ResyncDecision::AlreadyCovered { in_flight_from } => {
                slog::info!(
                    logger,
                    "Background sync from offset {:?} already covers offset {:?}",
                    in_flight_from,
                    from
                );
                return;
            }
            ResyncDecision::Closed => {
                slog::info!(logger, "Follower is shutting down, not starting background sync from {:?}", from);
                return;
            }
            ResyncDecision::Start {
                ticket,
                superseded_from,
            } => {
                if let Some(superseded_from) = superseded_from {
                    slog::info!(logger, "Cancelled background sync from offset {:?}", superseded_from);
                }
                ticket
            }
        };

        tokio::task::spawn(self.clone().run_resync(ticket));
    }

    async fn run_resync(self, ticket: ResyncTicket) {
        let logger = self.shared.logger.new(slog::o!("ResyncFrom" => ticket.from.as_u32()));
        slog::info!(logger, "Starting background sync from offset {:?}", ticket.from);

        match self.resync(&logger, ticket.from, &ticket.cancel_flag).await {
            Ok(num_synced) => slog::info!(logger, "Background sync succeeded, synced {} entries", num_synced),
            Err(ResyncError::Cancelled) => slog::info!(logger, "Background sync cancelled"),
            Err(e) => slog::error!(logger, "Background sync failed: {}", e),
        }

        self.resync_tracker().finish(ticket.id);
    }

    async fn resync(
        &self,
        logger: &slog::Logger,
        from: Offset,
        cancel_flag: &CancelFlag,
    ) -> Result<usize, ResyncError> {
        let options = &self.shared.resync_options;

        for attempt in 1..=options.max_attempts {
            if cancel_flag.is_cancelled() {
                return Err(ResyncError::Cancelled);
            }

            let read_result = tokio::time::timeout(options.rpc_timeout, self.shared.leader.read(from))
                .await
                .map_err(|_| ResyncError::LeaderReadTimeout)?;

            match read_result {
                Ok(entries) => return self.apply_synced_entries(logger, entries, cancel_flag).await,
                Err(ReadError::UncommittedEntriesPresent) => {
                    slog::warn!(
                        logger,
                        "Sync attempt {}/{}: leader has uncommitted entries, retrying in {:?}",
                        attempt,
                        options.max_attempts,
                        options.backoff
                    );
                    tokio::time::sleep(options.backoff).await;
                }
                Err(e) => return Err(ResyncError::LeaderRead(e)),
            }
        }

        Err(ResyncError::RetriesExhausted(options.max_attempts))
    }

    /// Appends entries pulled from the leader, one at a time under the state lock, persisting
    /// after each. Stops at the first gap rather than leave a hole in the log.
    async fn apply_synced_entries(
        &self,
        logger: &slog::Logger,
        entries: Vec<LogEntry>,
        cancel_flag: &CancelFlag,
    ) -> Result<usize, ResyncError> {
        let mut num_synced = 0;

        for entry in entries {
            // Leader reads only ever return committed entries.
            let entry = LogEntry {
                committed: true,
                ..entry
            };

            let mut state = self.shared.state.lock().await;
            if cancel_flag.is_cancelled() {
                return Err(ResyncError::Cancelled);
            }
            state.log = self.shared.store.load()?;

            let next_offset = state.log.next_offset();
            if entry.offset > next_offset {
                return Err(ResyncError::Gap {
                    expected: next_offset,
                    received: entry.offset,
                });
            }

            if entry.offset < next_offset {
                if state.log.get(entry.offset) == Some(&entry) {
                    continue;
                }
                slog::warn!(logger, "Replacing divergent local entries from offset {:?}", entry.offset);
                state.log.truncate(entry.offset);
            }

            slog::info!(
                logger,
                "Synced log entry from leader: offset={:?}, data={:?}",
                entry.offset,
                entry.data
            );
            state.log.append(entry);
            self.shared.store.save(&state.log)?;
            num_synced += 1;
        }

        Ok(num_synced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitlog::InMemoryStore;
    use crate::test_utils::{committed_entries, entry, eventually, test_logger, ScriptedLeader, ScriptedRead};
    use std::sync::atomic::Ordering;
    use tokio::time::Duration;

    fn follower(log: Vec<LogEntry>, leader: ScriptedLeader, max_attempts: u32) -> Follower<InMemoryStore, ScriptedLeader> {
        let options = ResyncOptions {
            backoff: Duration::from_millis(20),
            max_attempts,
            rpc_timeout: Duration::from_secs(1),
        };
        Follower::new(
            test_logger(),
            InMemoryStore::with_log(&Log::from_entries(log)),
            leader,
            options,
        )
    }

    async fn entries(follower: &Follower<InMemoryStore, ScriptedLeader>) -> Vec<LogEntry> {
        follower.log().await.unwrap().entries().to_vec()
    }

    async fn resync_finished(follower: &Follower<InMemoryStore, ScriptedLeader>) {
        let follower = follower.clone();
        eventually(move || {
            let follower = follower.clone();
            async move { follower.resync_in_flight().is_none() }
        })
        .await;
    }

    #[tokio::test]
    async fn accept_then_commit() {
        let follower = follower(vec![], ScriptedLeader::unreachable(), 1);

        // Leader-side `committed` flag is ignored on replication.
        let ack = follower.replicate_log(entry(0, 0, "A", true)).await.unwrap();
        assert_eq!(ack, Ack::accepted(ACK_OK));
        assert_eq!(entries(&follower).await, vec![entry(0, 0, "A", false)]);

        let ack = follower.commit(Epoch::new(0), Offset::new(0)).await.unwrap();
        assert_eq!(ack, Ack::accepted(ACK_COMMITTED));
        assert_eq!(entries(&follower).await, vec![entry(0, 0, "A", true)]);

        let ack = follower.commit(Epoch::new(0), Offset::new(5)).await.unwrap();
        assert_eq!(ack, Ack::rejected(ACK_NOT_FOUND));
        assert_eq!(entries(&follower).await, vec![entry(0, 0, "A", true)]);
    }

    #[tokio::test]
    async fn stale_epoch_is_rejected_without_changes() {
        let follower = follower(vec![], ScriptedLeader::unreachable(), 1);
        assert!(follower.replicate_log(entry(2, 0, "A", false)).await.unwrap().success);
        assert_eq!(follower.epoch().await, Epoch::new(2));

        let ack = follower.replicate_log(entry(1, 1, "B", false)).await.unwrap();

        assert_eq!(ack, Ack::rejected(ACK_STALE_EPOCH));
        assert_eq!(entries(&follower).await, vec![entry(2, 0, "A", false)]);
        assert_eq!(follower.epoch().await, Epoch::new(2));
    }

    #[tokio::test]
    async fn ahead_of_leader_truncates_then_rejects() {
        // -- setup --
        let leader = ScriptedLeader::unreachable();
        let calls = leader.calls();
        let follower = follower(committed_entries(0, &["A", "B", "C"]), leader, 1);

        // -- execute --
        let ack = follower.replicate_log(entry(0, 1, "X", false)).await.unwrap();

        // -- verify --
        assert_eq!(ack, Ack::rejected(ACK_SYNC_STARTED));
        assert_eq!(entries(&follower).await, committed_entries(0, &["A"]));
        assert_eq!(follower.resync_in_flight(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // The leader's retry at the same offset now lines up.
        assert!(follower.replicate_log(entry(0, 1, "X", false)).await.unwrap().success);
        assert_eq!(entries(&follower).await.len(), 2);
    }

    #[tokio::test]
    async fn redelivered_entry_truncates_uncommitted_tail() {
        let follower = follower(vec![], ScriptedLeader::unreachable(), 1);
        assert!(follower.replicate_log(entry(0, 0, "A", false)).await.unwrap().success);

        let ack = follower.replicate_log(entry(0, 0, "A", false)).await.unwrap();

        assert_eq!(ack, Ack::rejected(ACK_SYNC_STARTED));
        assert!(entries(&follower).await.is_empty());
    }

    #[tokio::test]
    async fn uncommitted_tail_at_resume_offset_needs_no_resync() {
        // -- setup --
        let leader = ScriptedLeader::unreachable();
        let calls = leader.calls();
        let follower = follower(vec![entry(0, 0, "A", true), entry(0, 1, "B", false)], leader, 1);

        // -- execute --
        let ack = follower.replicate_log(entry(0, 1, "B2", false)).await.unwrap();

        // -- verify --
        // Rejected even though the entry would fit after truncation.
        assert_eq!(ack, Ack::rejected(ACK_SYNC_STARTED));
        assert_eq!(entries(&follower).await, committed_entries(0, &["A"]));
        assert_eq!(follower.resync_in_flight(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let ack = follower.replicate_log(entry(0, 1, "B2", false)).await.unwrap();
        assert_eq!(ack, Ack::accepted(ACK_OK));
        assert_eq!(
            entries(&follower).await,
            vec![entry(0, 0, "A", true), entry(0, 1, "B2", false)]
        );
    }

    #[tokio::test]
    async fn uncommitted_tail_with_gap_resyncs_from_committed_prefix() {
        // -- setup --
        let leader_log = committed_entries(0, &["A", "B", "C"]);
        let leader = ScriptedLeader::always(ScriptedRead::Entries(leader_log.clone()));
        let read_offsets = leader.read_offsets();
        let follower = follower(vec![entry(0, 0, "A", true), entry(0, 1, "stale", false)], leader, 3);

        // -- execute --
        let ack = follower.replicate_log(entry(0, 3, "D", false)).await.unwrap();

        // -- verify --
        assert_eq!(ack, Ack::rejected(ACK_SYNC_STARTED));
        resync_finished(&follower).await;
        assert_eq!(entries(&follower).await, leader_log);
        assert_eq!(*read_offsets.lock().unwrap(), vec![Offset::new(1)]);
    }

    #[tokio::test]
    async fn behind_leader_catches_up_then_accepts() {
        let leader_log = committed_entries(0, &["A", "B", "C"]);
        let follower = follower(vec![], ScriptedLeader::always(ScriptedRead::Entries(leader_log.clone())), 3);

        let ack = follower.replicate_log(entry(0, 3, "D", false)).await.unwrap();
        assert_eq!(ack, Ack::rejected(ACK_SYNC_STARTED));

        resync_finished(&follower).await;
        assert_eq!(entries(&follower).await, leader_log);
        assert!(follower.replicate_log(entry(0, 3, "D", false)).await.unwrap().success);
    }

    #[tokio::test]
    async fn resync_retries_while_leader_has_uncommitted_entries() {
        let leader = ScriptedLeader::sequence(vec![
            ScriptedRead::Uncommitted,
            ScriptedRead::Uncommitted,
            ScriptedRead::Entries(committed_entries(0, &["A", "B"])),
        ]);
        let calls = leader.calls();
        let follower = follower(vec![], leader, 5);

        follower.replicate_log(entry(0, 2, "C", false)).await.unwrap();

        resync_finished(&follower).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(entries(&follower).await, committed_entries(0, &["A", "B"]));
    }

    #[tokio::test]
    async fn resync_gives_up_after_max_attempts() {
        let leader = ScriptedLeader::always(ScriptedRead::Uncommitted);
        let calls = leader.calls();
        let follower = follower(vec![], leader, 3);

        follower.replicate_log(entry(0, 2, "C", false)).await.unwrap();

        resync_finished(&follower).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(entries(&follower).await.is_empty());
    }

    #[tokio::test]
    async fn resync_stops_on_unreachable_leader() {
        let leader = ScriptedLeader::unreachable();
        let calls = leader.calls();
        let follower = follower(vec![], leader, 5);

        follower.replicate_log(entry(0, 2, "C", false)).await.unwrap();

        resync_finished(&follower).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn resync_never_appends_past_a_gap() {
        let leader = ScriptedLeader::always(ScriptedRead::Entries(vec![entry(0, 2, "C", true)]));
        let follower = follower(vec![], leader, 3);

        follower.replicate_log(entry(0, 3, "D", false)).await.unwrap();

        resync_finished(&follower).await;
        assert!(entries(&follower).await.is_empty());
    }

    #[tokio::test]
    async fn later_resync_request_is_coalesced() {
        // -- setup --
        let leader = ScriptedLeader::always(ScriptedRead::Uncommitted);
        let read_offsets = leader.read_offsets();
        let follower = follower(vec![], leader, 5);

        // -- execute --
        follower.replicate_log(entry(0, 5, "F", false)).await.unwrap();
        assert_eq!(follower.resync_in_flight(), Some(Offset::new(0)));
        follower.replicate_log(entry(0, 7, "H", false)).await.unwrap();

        // -- verify --
        resync_finished(&follower).await;
        let read_offsets = read_offsets.lock().unwrap().clone();
        assert_eq!(read_offsets, vec![Offset::new(0); 5]);
    }

    #[tokio::test]
    async fn earlier_resync_request_supersedes_in_flight_one() {
        // -- setup --
        let leader = ScriptedLeader::always(ScriptedRead::Uncommitted);
        let read_offsets = leader.read_offsets();
        let follower = follower(committed_entries(0, &["A", "B"]), leader, 5);

        follower.replicate_log(entry(0, 4, "E", false)).await.unwrap();
        assert_eq!(follower.resync_in_flight(), Some(Offset::new(2)));

        // -- execute --
        // Truncate to empty, then fall behind from offset 0.
        follower.replicate_log(entry(0, 0, "A2", false)).await.unwrap();
        follower.replicate_log(entry(0, 3, "D", false)).await.unwrap();
        assert_eq!(follower.resync_in_flight(), Some(Offset::new(0)));

        // -- verify --
        resync_finished(&follower).await;
        let read_offsets = read_offsets.lock().unwrap().clone();
        let reads_from = |offset| read_offsets.iter().filter(|o| **o == Offset::new(offset)).count();
        assert_eq!(reads_from(0), 5);
        assert!(reads_from(2) < 5, "superseded resync kept running: {:?}", read_offsets);
    }

    #[tokio::test]
    async fn concurrent_replication_and_resync_keep_log_dense() {
        let leader_log = committed_entries(0, &["A", "B", "C"]);
        let follower = follower(vec![], ScriptedLeader::always(ScriptedRead::Entries(leader_log.clone())), 3);

        // Keep retrying the leader's next entry while the resync runs.
        let retrying = follower.clone();
        eventually(move || {
            let follower = retrying.clone();
            async move {
                follower
                    .replicate_log(entry(0, 3, "D", false))
                    .await
                    .map(|ack| ack.success)
                    .unwrap_or(false)
            }
        })
        .await;

        let log = entries(&follower).await;
        let mut expected = leader_log;
        expected.push(entry(0, 3, "D", false));
        assert_eq!(log, expected);
        for (i, entry) in log.iter().enumerate() {
            assert_eq!(entry.offset, Offset::new_usize(i));
        }
    }

    #[tokio::test]
    async fn shutdown_stops_background_sync() {
        // -- setup --
        let leader = ScriptedLeader::always(ScriptedRead::Uncommitted);
        let calls = leader.calls();
        let follower = follower(vec![], leader, 1000);
        follower.replicate_log(entry(0, 5, "F", false)).await.unwrap();
        assert_eq!(follower.resync_in_flight(), Some(Offset::new(0)));

        // -- execute --
        follower.shutdown();
        let calls_at_shutdown = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;

        // -- verify --
        assert_eq!(calls.load(Ordering::SeqCst), calls_at_shutdown);
        assert_eq!(follower.resync_in_flight(), None);

        // Still falls behind, but no new sync starts.
        let ack = follower.replicate_log(entry(0, 7, "H", false)).await.unwrap();
        assert_eq!(ack, Ack::rejected(ACK_SYNC_STARTED));
        assert_eq!(follower.resync_in_flight(), None);
        let calls_after_replicate = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), calls_after_replicate);
    }
}
