// Copyright 2019 Brian Gianforcaro

use std::sync::atomic::{AtomicU64, Ordering};

/// Why a record that passed the filter was not emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The flush lock was contended while the initialization lock was
    /// possibly held, so blocking could have closed a lock cycle.
    InitLockHeld,
    /// The blocking acquisition did not complete within the configured timeout.
    Timeout,
    /// The emit sink logged back into the handler from the thread that
    /// already holds its flush lock.
    Reentrant,
}

/// Operational counters for one handler.
///
/// Drops are reported here and nowhere else: the handler never writes a
/// log record about a record it had to drop.
#[derive(Debug, Default)]
pub struct HandlerStats {
    emitted: AtomicU64,
    rejected: AtomicU64,
    dropped_init_lock: AtomicU64,
    dropped_timeout: AtomicU64,
    dropped_reentrant: AtomicU64,
    emit_failures: AtomicU64,
    lock_acquisitions: AtomicU64,
    lock_releases: AtomicU64,
}

const ORDERING_VAL: Ordering = Ordering::SeqCst;

impl HandlerStats {
    pub fn new() -> HandlerStats {
        HandlerStats::default()
    }

    #[inline]
    pub(crate) fn record_emitted(&self) {
        self.emitted.fetch_add(1, ORDERING_VAL);
    }

    #[inline]
    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, ORDERING_VAL);
    }

    #[inline]
    pub(crate) fn record_dropped(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::InitLockHeld => &self.dropped_init_lock,
            DropReason::Timeout => &self.dropped_timeout,
            DropReason::Reentrant => &self.dropped_reentrant,
        };
        counter.fetch_add(1, ORDERING_VAL);
    }

    #[inline]
    pub(crate) fn record_emit_failure(&self) {
        self.emit_failures.fetch_add(1, ORDERING_VAL);
    }

    #[inline]
    pub(crate) fn record_acquisition(&self) {
        self.lock_acquisitions.fetch_add(1, ORDERING_VAL);
    }

    #[inline]
    pub(crate) fn record_release(&self) {
        self.lock_releases.fetch_add(1, ORDERING_VAL);
    }

    /// Reads every counter. Counters are read one at a time, so a snapshot
    /// taken while calls are in flight may be mid-update.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            emitted: self.emitted.load(ORDERING_VAL),
            rejected: self.rejected.load(ORDERING_VAL),
            dropped_init_lock: self.dropped_init_lock.load(ORDERING_VAL),
            dropped_timeout: self.dropped_timeout.load(ORDERING_VAL),
            dropped_reentrant: self.dropped_reentrant.load(ORDERING_VAL),
            emit_failures: self.emit_failures.load(ORDERING_VAL),
            lock_acquisitions: self.lock_acquisitions.load(ORDERING_VAL),
            lock_releases: self.lock_releases.load(ORDERING_VAL),
        }
    }
}

/// Point in time copy of [`HandlerStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub emitted: u64,
    pub rejected: u64,
    pub dropped_init_lock: u64,
    pub dropped_timeout: u64,
    pub dropped_reentrant: u64,
    pub emit_failures: u64,
    pub lock_acquisitions: u64,
    pub lock_releases: u64,
}

impl StatsSnapshot {
    /// Total records dropped for any reason.
    pub fn dropped(&self) -> u64 {
        self.dropped_init_lock + self.dropped_timeout + self.dropped_reentrant
    }

    /// True when every flush lock acquisition has been released exactly once.
    pub fn lock_balanced(&self) -> bool {
        self.lock_acquisitions == self.lock_releases
    }
}
