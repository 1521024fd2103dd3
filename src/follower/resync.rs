use crate::commitlog::{LogStoreError, Offset};
use crate::leader::ReadError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Duration;

/// ResyncOptions bounds a follower's background catch-up against the leader.
#[derive(Clone, Debug)]
pub struct ResyncOptions {
    /// Wait between attempts when the leader refuses a read because of uncommitted entries.
    pub backoff: Duration,
    /// Total leader reads before giving up. Always >= 1.
    pub max_attempts: u32,
    /// Bound on a single leader read.
    pub rpc_timeout: Duration,
}

impl Default for ResyncOptions {
    fn default() -> Self {
        ResyncOptions {
            backoff: Duration::from_millis(100),
            max_attempts: 10,
            rpc_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(super) enum ResyncError {
    #[error("leader still had uncommitted entries after {0} attempts")]
    RetriesExhausted(u32),
    #[error("leader read failed: {0}")]
    LeaderRead(ReadError),
    #[error("leader read timed out")]
    LeaderReadTimeout,
    #[error("leader returned offset {received:?} but local log ends at {expected:?}")]
    Gap { expected: Offset, received: Offset },
    #[error("local log store failure: {0}")]
    Store(#[from] LogStoreError),
    #[error("cancelled by a newer resync")]
    Cancelled,
}

/// Set when the resync that owns the paired [`CancelOnDrop`] has been superseded.
pub(super) struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub(super) fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

struct InFlightResync {
    id: u64,
    from: Offset,
    _cancel: CancelOnDrop,
}

/// ResyncTicket is handed to a newly spawned resync task.
pub(super) struct ResyncTicket {
    pub(super) id: u64,
    pub(super) from: Offset,
    pub(super) cancel_flag: CancelFlag,
}

pub(super) enum ResyncDecision {
    Start {
        ticket: ResyncTicket,
        superseded_from: Option<Offset>,
    },
    AlreadyCovered {
        in_flight_from: Offset,
    },
    Closed,
}

/// ResyncTracker allows at most one resync per follower.
///
/// A request starting at or after the in-flight resync's offset is covered by it. A request
/// starting earlier cancels the in-flight one and takes its place. Once closed, nothing starts.
pub(super) struct ResyncTracker {
    next_id: u64,
    in_flight: Option<InFlightResync>,
    closed: bool,
}

impl ResyncTracker {
    pub(super) fn new() -> Self {
        ResyncTracker {
            next_id: 0,
            in_flight: None,
            closed: false,
        }
    }

    pub(super) fn request(&mut self, from: Offset) -> ResyncDecision {
        if self.closed {
            return ResyncDecision::Closed;
        }
        if let Some(in_flight) = &self.in_flight {
            if from >= in_flight.from {
                return ResyncDecision::AlreadyCovered {
                    in_flight_from: in_flight.from,
                };
            }
        }

        let id = self.next_id;
        self.next_id += 1;

        let flag = Arc::new(AtomicBool::new(false));
        let superseded = self.in_flight.replace(InFlightResync {
            id,
            from,
            _cancel: CancelOnDrop(flag.clone()),
        });

        ResyncDecision::Start {
            ticket: ResyncTicket {
                id,
                from,
                cancel_flag: CancelFlag(flag),
            },
            // Dropping the superseded entry cancels it.
            superseded_from: superseded.map(|in_flight| in_flight.from),
        }
    }

    /// Called by a resync task on exit. A no-op if the task was already superseded.
    pub(super) fn finish(&mut self, id: u64) {
        if matches!(&self.in_flight, Some(in_flight) if in_flight.id == id) {
            self.in_flight = None;
        }
    }

    /// Cancels the in-flight resync, if any, and refuses all later requests.
    pub(super) fn close(&mut self) -> Option<Offset> {
        self.closed = true;
        self.in_flight.take().map(|in_flight| in_flight.from)
    }

    pub(super) fn in_flight_from(&self) -> Option<Offset> {
        self.in_flight.as_ref().map(|in_flight| in_flight.from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(decision: ResyncDecision) -> (ResyncTicket, Option<Offset>) {
        match decision {
            ResyncDecision::Start {
                ticket,
                superseded_from,
            } => (ticket, superseded_from),
            ResyncDecision::AlreadyCovered { in_flight_from } => {
                panic!("Expected new resync, but {:?} is in flight", in_flight_from)
            }
            ResyncDecision::Closed => panic!("Expected new resync, but tracker is closed"),
        }
    }

    #[test]
    fn first_request_starts_resync() {
        let mut tracker = ResyncTracker::new();

        let (ticket, superseded) = start(tracker.request(Offset::new(4)));

        assert_eq!(ticket.from, Offset::new(4));
        assert_eq!(superseded, None);
        assert!(!ticket.cancel_flag.is_cancelled());
        assert_eq!(tracker.in_flight_from(), Some(Offset::new(4)));
    }

    #[test]
    fn later_offset_is_covered_by_in_flight_resync() {
        let mut tracker = ResyncTracker::new();
        let (ticket, _) = start(tracker.request(Offset::new(2)));

        for from in [2, 3, 10].iter() {
            match tracker.request(Offset::new(*from)) {
                ResyncDecision::AlreadyCovered { in_flight_from } => assert_eq!(in_flight_from, Offset::new(2)),
                ResyncDecision::Start { .. } => panic!("Started duplicate resync from {}", from),
                ResyncDecision::Closed => panic!("Tracker closed unexpectedly"),
            }
        }
        assert!(!ticket.cancel_flag.is_cancelled());
    }

    #[test]
    fn earlier_offset_supersedes_and_cancels_in_flight_resync() {
        let mut tracker = ResyncTracker::new();
        let (old_ticket, _) = start(tracker.request(Offset::new(5)));

        let (new_ticket, superseded) = start(tracker.request(Offset::new(1)));

        assert_eq!(superseded, Some(Offset::new(5)));
        assert!(old_ticket.cancel_flag.is_cancelled());
        assert!(!new_ticket.cancel_flag.is_cancelled());
        assert_eq!(tracker.in_flight_from(), Some(Offset::new(1)));
    }

    #[test]
    fn finish_only_clears_own_slot() {
        let mut tracker = ResyncTracker::new();
        let (old_ticket, _) = start(tracker.request(Offset::new(5)));
        let (new_ticket, _) = start(tracker.request(Offset::new(1)));

        // The superseded task exiting must not clear its replacement.
        tracker.finish(old_ticket.id);
        assert_eq!(tracker.in_flight_from(), Some(Offset::new(1)));

        tracker.finish(new_ticket.id);
        assert_eq!(tracker.in_flight_from(), None);

        // Slot is free again.
        start(tracker.request(Offset::new(7)));
    }

    #[test]
    fn close_cancels_in_flight_and_refuses_new_requests() {
        let mut tracker = ResyncTracker::new();
        let (ticket, _) = start(tracker.request(Offset::new(3)));

        assert_eq!(tracker.close(), Some(Offset::new(3)));

        assert!(ticket.cancel_flag.is_cancelled());
        assert_eq!(tracker.in_flight_from(), None);
        assert!(matches!(tracker.request(Offset::new(0)), ResyncDecision::Closed));
        // Idempotent.
        assert_eq!(tracker.close(), None);
    }
}
