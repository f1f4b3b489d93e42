// Copyright 2019 Brian Gianforcaro

use crate::init_lock::GlobalInitLock;
use crate::stats::HandlerStats;
use parking_lot::MutexGuard;
use std::sync::atomic::{AtomicU64, Ordering};

/// Token meaning "no thread owns the flush lock".
pub(crate) const NO_OWNER: u64 = 0;

/// Returns a small process-unique token for the calling thread.
pub(crate) fn current_thread_token() -> u64 {
    static NEXT_TOKEN: AtomicU64 = AtomicU64::new(NO_OWNER + 1);

    thread_local! {
        static TOKEN: u64 = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    }

    TOKEN.with(|token| *token)
}

/// An RAII implementation of a "scoped lock" pattern, specialized to
/// the flush lock of a [`SafeLogHandler`](crate::SafeLogHandler). When
/// this structure is dropped the owner slot is cleared, the release is
/// counted, and only then is the underlying lock released.
///
/// This structure is created by the handler's acquisition paths.
///
pub(crate) struct FlushGuard<'a> {
    owner: &'a AtomicU64,
    stats: &'a HandlerStats,
    // Unlocked after our Drop body has run.
    _lock: MutexGuard<'a, ()>,
}

impl<'a> FlushGuard<'a> {
    pub(crate) fn new(
        lock: MutexGuard<'a, ()>,
        owner: &'a AtomicU64,
        stats: &'a HandlerStats,
    ) -> FlushGuard<'a> {
        owner.store(current_thread_token(), Ordering::SeqCst);
        stats.record_acquisition();

        FlushGuard {
            owner,
            stats,
            _lock: lock,
        }
    }
}

impl<'a> Drop for FlushGuard<'a> {
    fn drop(&mut self) {
        self.owner.store(NO_OWNER, Ordering::SeqCst);
        self.stats.record_release();
    }
}

/// An RAII guard marking the calling thread as inside a one-time
/// initialization section. When dropped the section is exited and any
/// thread waiting for the initialization lock to drain may be woken.
///
/// This structure is created by [`GlobalInitLock::enter`].
///
#[must_use = "the initialization section ends as soon as the guard is dropped"]
pub struct InitSectionGuard<'a> {
    init_lock: &'a GlobalInitLock,
}

impl<'a> InitSectionGuard<'a> {
    pub(crate) fn new(init_lock: &'a GlobalInitLock) -> InitSectionGuard<'a> {
        InitSectionGuard { init_lock }
    }
}

impl<'a> Drop for InitSectionGuard<'a> {
    fn drop(&mut self) {
        self.init_lock.exit()
    }
}
