// Copyright 2019 Brian Gianforcaro

use crate::flags::{to_flags, InitLockFlags};
use crate::guard::InitSectionGuard;
use lazy_init::Lazy;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

/// Read-only view of the process-wide initialization lock.
///
/// Implementations must be non-blocking and O(1), must never acquire a
/// handler's flush lock or log, and must be conservative: returning `true`
/// when no section is active is allowed, returning `false` while one is
/// active is not.
pub trait InitLockQuery: Send + Sync {
    fn is_possibly_held(&self) -> bool;
}

impl<T: InitLockQuery + ?Sized> InitLockQuery for Arc<T> {
    #[inline]
    fn is_possibly_held(&self) -> bool {
        (**self).is_possibly_held()
    }
}

impl<T: InitLockQuery + ?Sized> InitLockQuery for &'static T {
    #[inline]
    fn is_possibly_held(&self) -> bool {
        (**self).is_possibly_held()
    }
}

/// Adapter turning a closure into an [`InitLockQuery`].
pub struct QueryFn<F>(F);

impl<F> InitLockQuery for QueryFn<F>
where
    F: Fn() -> bool + Send + Sync,
{
    #[inline]
    fn is_possibly_held(&self) -> bool {
        (self.0)()
    }
}

/// Wraps an embedding runtime's "is initialization in progress" check.
pub fn query_fn<F>(query: F) -> QueryFn<F>
where
    F: Fn() -> bool + Send + Sync,
{
    QueryFn(query)
}

struct WaitQueue {
    mutex: Mutex<()>,
    released: Condvar,
}

impl WaitQueue {
    fn new() -> WaitQueue {
        WaitQueue {
            mutex: Mutex::new(()),
            released: Condvar::new(),
        }
    }
}

/// Tracks threads inside one-time initialization sections.
///
/// Any number of threads may be inside a section at once; the lock counts
/// as held while at least one is. Observers only ever see a point in time
/// snapshot, so callers must query again rather than cache the answer.
pub struct GlobalInitLock {
    state: AtomicU64,

    // Avoid allocating the wait queue unless some thread
    // actually waits for the sections to drain.
    //
    waiters: Lazy<WaitQueue>,
}

const ORDERING_VAL: Ordering = Ordering::SeqCst;

impl GlobalInitLock {
    /// Initializes a new, vacant ['GlobalInitLock'].
    #[inline]
    pub fn new() -> GlobalInitLock {
        GlobalInitLock {
            state: AtomicU64::new(0),
            waiters: Lazy::new(),
        }
    }

    /// The process-wide instance used by handlers that were not given
    /// an explicit query.
    pub fn global() -> &'static GlobalInitLock {
        static GLOBAL_INIT_LOCK: OnceLock<GlobalInitLock> = OnceLock::new();
        GLOBAL_INIT_LOCK.get_or_init(GlobalInitLock::new)
    }

    /// Marks the calling thread as inside an initialization section
    /// until the returned guard is dropped.
    pub fn enter(&self) -> InitSectionGuard<'_> {
        let mut current = self.load_flags();

        loop {
            let bits_with_holder = current.add_holder();

            match self.compare_exchange(current.bits(), bits_with_holder) {
                Ok(_) => break,
                Err(new_current) => current = to_flags(new_current),
            }
        }

        InitSectionGuard::new(self)
    }

    /// Runs `init` inside an initialization section.
    pub fn initialize<T, F>(&self, init: F) -> T
    where
        F: FnOnce() -> T,
    {
        let _section = self.enter();
        init()
    }

    /// Returns true if any thread might be inside an initialization section.
    #[inline]
    pub fn is_possibly_held(&self) -> bool {
        self.load_flags().is_held()
    }

    /// Number of threads currently inside an initialization section.
    #[inline]
    pub fn holders(&self) -> u64 {
        self.load_flags().holder_count()
    }

    /// Blocks thread execution until no thread is inside an
    /// initialization section.
    pub fn wait_for_release(&self) {
        self.wait_internal(None);
    }

    /// Like [`wait_for_release`](Self::wait_for_release) but gives up after
    /// `timeout`. Returns true if the lock was observed vacant.
    pub fn wait_for_release_timeout(&self, timeout: Duration) -> bool {
        self.wait_internal(Some(Instant::now() + timeout))
    }

    /// Leave a previously entered section. Called by the guard.
    pub(crate) fn exit(&self) {
        let mut current = self.load_flags();

        loop {
            let bits_without_holder = current.remove_holder();

            match self.compare_exchange(current.bits(), bits_without_holder) {
                Ok(_) => break,
                Err(new_current) => current = to_flags(new_current),
            }
        }

        // The release that drained the last holder wakes anyone waiting.
        if current.has_waiters() && current.holder_count() == 1 {
            let queue = self.waiters.get().expect("Must have been set");
            let _lock = queue.mutex.lock();
            queue.released.notify_all();
        }
    }

    fn wait_internal(&self, deadline: Option<Instant>) -> bool {
        if !self.is_possibly_held() {
            return true;
        }

        let queue = self.waiters.get_or_create(WaitQueue::new);
        let mut lock = queue.mutex.lock();

        loop {
            // Announcing under the queue mutex means the draining release
            // cannot notify between our check and our wait.
            if !self.announce_waiter() {
                return true;
            }

            match deadline {
                None => queue.released.wait(&mut lock),
                Some(deadline) => {
                    if queue.released.wait_until(&mut lock, deadline).timed_out() {
                        return !self.is_possibly_held();
                    }
                }
            }
        }
    }

    /// Sets the waiters flag. Returns false if the lock is already vacant.
    fn announce_waiter(&self) -> bool {
        let mut current = self.load_flags();

        loop {
            if current.is_vacant() {
                return false;
            }

            if current.has_waiters() {
                return true;
            }

            let bits_with_waiters = current.set_waiters_present();

            match self.compare_exchange(current.bits(), bits_with_waiters) {
                Ok(_) => return true,
                Err(new_current) => current = to_flags(new_current),
            }
        }
    }

    #[inline]
    fn load_flags(&self) -> InitLockFlags {
        to_flags(self.state.load(ORDERING_VAL))
    }

    /// Internal helper method to make all of the compare exchange loops a bit
    /// more readable by omitting constant parameters.
    #[inline]
    fn compare_exchange(&self, current: u64, new: u64) -> Result<u64, u64> {
        self.state
            .compare_exchange(current, new, ORDERING_VAL, ORDERING_VAL)
    }
}

impl Default for GlobalInitLock {
    fn default() -> Self {
        Self::new()
    }
}

impl InitLockQuery for GlobalInitLock {
    #[inline]
    fn is_possibly_held(&self) -> bool {
        GlobalInitLock::is_possibly_held(self)
    }
}
