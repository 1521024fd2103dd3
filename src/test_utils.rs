use crate::commitlog::{Epoch, LogEntry, Offset};
use crate::follower::LeaderClient;
use crate::leader::ReadError;
use crate::rpc::RpcError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn test_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

pub(crate) fn entry(epoch: u32, offset: u32, data: &str, committed: bool) -> LogEntry {
    LogEntry {
        epoch: Epoch::new(epoch),
        offset: Offset::new(offset),
        data: data.to_string(),
        committed,
    }
}

pub(crate) fn committed_entries(epoch: u32, data: &[&str]) -> Vec<LogEntry> {
    data.iter()
        .enumerate()
        .map(|(offset, data)| entry(epoch, offset as u32, data, true))
        .collect()
}

/// Polls `condition` until it holds, panicking after a few seconds.
pub(crate) async fn eventually<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition().await {
        assert!(tokio::time::Instant::now() < deadline, "Condition not met before deadline");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[derive(Clone, Debug)]
pub(crate) enum ScriptedRead {
    Entries(Vec<LogEntry>),
    Uncommitted,
    Unavailable,
}

/// ScriptedLeader answers reads from a fixed script, then with `Unavailable` once it runs out.
/// If built with `always`, the same answer repeats forever.
pub(crate) struct ScriptedLeader {
    script: Mutex<VecDeque<ScriptedRead>>,
    repeat: Option<ScriptedRead>,
    read_offsets: Arc<Mutex<Vec<Offset>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedLeader {
    pub(crate) fn sequence(script: Vec<ScriptedRead>) -> Self {
        ScriptedLeader {
            script: Mutex::new(script.into()),
            repeat: None,
            read_offsets: Arc::new(Mutex::new(vec![])),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn always(read: ScriptedRead) -> Self {
        ScriptedLeader {
            repeat: Some(read),
            ..Self::sequence(vec![])
        }
    }

    pub(crate) fn unreachable() -> Self {
        Self::always(ScriptedRead::Unavailable)
    }

    pub(crate) fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }

    pub(crate) fn read_offsets(&self) -> Arc<Mutex<Vec<Offset>>> {
        self.read_offsets.clone()
    }
}

#[async_trait::async_trait]
impl LeaderClient for ScriptedLeader {
    async fn read(&self, from: Offset) -> Result<Vec<LogEntry>, ReadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.read_offsets.lock().unwrap().push(from);

        let next = match &self.repeat {
            Some(read) => read.clone(),
            None => self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(ScriptedRead::Unavailable),
        };

        match next {
            ScriptedRead::Entries(entries) => Ok(entries
                .into_iter()
                .filter(|entry| entry.offset >= from)
                .collect()),
            ScriptedRead::Uncommitted => Err(ReadError::UncommittedEntriesPresent),
            ScriptedRead::Unavailable => Err(ReadError::Rpc(RpcError::Connect("leader is offline".into()))),
        }
    }
}
