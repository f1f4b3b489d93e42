// Copyright 2019 Brian Gianforcaro

use crate::config::HandlerConfig;
use crate::guard::{current_thread_token, FlushGuard, NO_OWNER};
use crate::init_lock::{GlobalInitLock, InitLockQuery};
use crate::record::{Filter, LogRecord};
use crate::sink::{EmitError, EmitSink};
use crate::stats::{DropReason, HandlerStats, StatsSnapshot};
use log::{LevelFilter, Metadata, Record, SetLoggerError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// How a single call to [`SafeLogHandler::dispatch`] resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The sink ran under the flush lock and returned success.
    Emitted,
    /// The filter turned the record away before any locking.
    Rejected,
    /// The record was discarded to keep the caller from blocking.
    Dropped(DropReason),
}

impl Disposition {
    #[inline]
    pub fn is_emitted(self) -> bool {
        self == Disposition::Emitted
    }
}

/// A log handler that never becomes the second half of a lock cycle with
/// the process-wide initialization lock.
///
/// Every record is first offered to the flush lock without blocking. When
/// that fails the handler asks its [`InitLockQuery`] whether an
/// initialization section might be active. If so the record is dropped,
/// otherwise the handler waits for the flush lock (optionally bounded by a
/// timeout). The emit sink always runs with the flush lock held and the
/// lock is released on every exit path.
///
/// The handler only ever observes the initialization lock; it never enters
/// or waits on it.
pub struct SafeLogHandler {
    flush_lock: Mutex<()>,
    // Thread token of the current flush lock holder, NO_OWNER when free.
    owner: AtomicU64,
    filter: Filter,
    sink: Box<dyn EmitSink>,
    init_lock: Box<dyn InitLockQuery>,
    block_timeout: Option<Duration>,
    stats: HandlerStats,
}

impl SafeLogHandler {
    /// Starts building a handler that emits into `sink`.
    pub fn builder<S: EmitSink + 'static>(sink: S) -> HandlerBuilder {
        HandlerBuilder::new(Box::new(sink))
    }

    /// Offers `record` to the handler. Returns `Ok(true)` only if the sink
    /// ran and succeeded; rejected and dropped records yield `Ok(false)`.
    pub fn handle(&self, record: &LogRecord) -> Result<bool, EmitError> {
        self.dispatch(record).map(Disposition::is_emitted)
    }

    /// Runs the filter, acquire, emit, release protocol for one record.
    pub fn dispatch(&self, record: &LogRecord) -> Result<Disposition, EmitError> {
        if !self.filter.accepts(record) {
            self.stats.record_rejected();
            return Ok(Disposition::Rejected);
        }

        let guard = match self.try_acquire() {
            Some(guard) => guard,
            None => match self.acquire_contended() {
                Ok(guard) => guard,
                Err(reason) => {
                    self.stats.record_dropped(reason);
                    return Ok(Disposition::Dropped(reason));
                }
            },
        };

        let result = self.sink.emit(record);
        drop(guard);

        match result {
            Ok(()) => {
                self.stats.record_emitted();
                Ok(Disposition::Emitted)
            }
            Err(err) => {
                self.stats.record_emit_failure();
                Err(err)
            }
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn block_timeout(&self) -> Option<Duration> {
        self.block_timeout
    }

    /// Installs the handler as the process-wide `log` backend.
    pub fn install(self, max_level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_boxed_logger(Box::new(self))?;
        log::set_max_level(max_level);
        Ok(())
    }

    fn try_acquire(&self) -> Option<FlushGuard<'_>> {
        self.flush_lock
            .try_lock()
            .map(|lock| FlushGuard::new(lock, &self.owner, &self.stats))
    }

    /// The flush lock is busy: decide between dropping and blocking.
    fn acquire_contended(&self) -> Result<FlushGuard<'_>, DropReason> {
        // Only this thread can have stored its own token, so this read
        // cannot race into a false positive.
        if self.owner.load(Ordering::SeqCst) == current_thread_token() {
            return Err(DropReason::Reentrant);
        }

        if self.init_lock.is_possibly_held() {
            return Err(DropReason::InitLockHeld);
        }

        let lock = match self.block_timeout {
            None => self.flush_lock.lock(),
            Some(timeout) => self
                .flush_lock
                .try_lock_for(timeout)
                .ok_or(DropReason::Timeout)?,
        };

        Ok(FlushGuard::new(lock, &self.owner, &self.stats))
    }
}

impl log::Log for SafeLogHandler {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.filter.max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // There is no caller to hand an emit error back to here; the
        // failure is already counted in the stats.
        let _ = self.dispatch(&LogRecord::from(record));
    }

    fn flush(&self) {
        self.sink.flush()
    }
}

/// Configures and builds a [`SafeLogHandler`].
pub struct HandlerBuilder {
    sink: Box<dyn EmitSink>,
    filter: Filter,
    init_lock: Box<dyn InitLockQuery>,
    block_timeout: Option<Duration>,
}

impl HandlerBuilder {
    fn new(sink: Box<dyn EmitSink>) -> HandlerBuilder {
        HandlerBuilder {
            sink,
            filter: Filter::AllowAll,
            init_lock: Box::new(GlobalInitLock::global()),
            block_timeout: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> HandlerBuilder {
        self.filter = filter;
        self
    }

    /// Replaces the default [`GlobalInitLock::global`] query.
    pub fn init_lock_query<Q: InitLockQuery + 'static>(mut self, query: Q) -> HandlerBuilder {
        self.init_lock = Box::new(query);
        self
    }

    /// Bounds the blocking acquisition; an expired wait drops the record.
    pub fn block_timeout(mut self, timeout: Duration) -> HandlerBuilder {
        self.block_timeout = Some(timeout);
        self
    }

    /// Applies the level threshold and timeout from `config`.
    pub fn config(mut self, config: &HandlerConfig) -> HandlerBuilder {
        self.filter = Filter::Threshold(config.level);
        self.block_timeout = config.block_timeout();
        self
    }

    pub fn build(self) -> SafeLogHandler {
        SafeLogHandler {
            flush_lock: Mutex::new(()),
            owner: AtomicU64::new(NO_OWNER),
            filter: self.filter,
            sink: self.sink,
            init_lock: self.init_lock,
            block_timeout: self.block_timeout,
            stats: HandlerStats::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{Disposition, SafeLogHandler};
    use crate::config::HandlerConfig;
    use crate::init_lock::query_fn;
    use crate::record::{Filter, LogRecord};
    use crate::sink::{sink_fn, EmitError};
    use crate::stats::DropReason;
    use log::{Level, LevelFilter, Log};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, OnceLock};
    use std::time::Duration;

    fn counting_sink(count: &Arc<AtomicUsize>) -> impl Fn(&LogRecord) -> Result<(), EmitError> {
        let count = Arc::clone(count);
        move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    //-------------------------------------------------------------------
    // Test: test_rejected_record_skips_lock
    //
    // Description:
    //  A filtered record never touches the flush lock or the sink.
    //
    #[test]
    fn test_rejected_record_skips_lock() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = SafeLogHandler::builder(sink_fn(counting_sink(&count)))
            .filter(Filter::Threshold(LevelFilter::Error))
            .init_lock_query(query_fn(|| false))
            .build();

        let result = handler.dispatch(&LogRecord::new(Level::Info, "ignored")).unwrap();

        assert_eq!(Disposition::Rejected, result);
        assert_eq!(0, count.load(Ordering::SeqCst));
        assert_eq!(1, handler.stats().rejected);
        assert_eq!(0, handler.stats().lock_acquisitions);
    }

    //-------------------------------------------------------------------
    // Test: test_held_lock_drops_when_init_possibly_held
    //
    // Description:
    //  With the flush lock held elsewhere, a possibly held init lock
    //  turns the call into a drop instead of a wait.
    //
    #[test]
    fn test_held_lock_drops_when_init_possibly_held() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = SafeLogHandler::builder(sink_fn(counting_sink(&count)))
            .init_lock_query(query_fn(|| true))
            .build();

        let held = handler.flush_lock.lock();
        let result = std::thread::scope(|scope| {
            scope
                .spawn(|| handler.dispatch(&LogRecord::new(Level::Info, "x")))
                .join()
                .unwrap()
        });
        drop(held);

        assert_eq!(Disposition::Dropped(DropReason::InitLockHeld), result.unwrap());
        assert_eq!(0, count.load(Ordering::SeqCst));
    }

    //-------------------------------------------------------------------
    // Test: test_block_timeout_drops
    //
    #[test]
    fn test_block_timeout_drops() {
        let count = Arc::new(AtomicUsize::new(0));
        let handler = SafeLogHandler::builder(sink_fn(counting_sink(&count)))
            .init_lock_query(query_fn(|| false))
            .block_timeout(Duration::from_millis(20))
            .build();

        let held = handler.flush_lock.lock();
        let result = std::thread::scope(|scope| {
            scope
                .spawn(|| handler.dispatch(&LogRecord::new(Level::Info, "x")))
                .join()
                .unwrap()
        });
        drop(held);

        assert_eq!(Disposition::Dropped(DropReason::Timeout), result.unwrap());
        assert_eq!(1, handler.stats().dropped_timeout);
    }

    //-------------------------------------------------------------------
    // Test: test_reentrant_emit_is_dropped
    //
    // Description:
    //  A sink that logs back into its own handler would wait on a lock
    //  its own thread holds. The nested record is dropped instead, even
    //  though the init lock reads as vacant.
    //
    #[test]
    fn test_reentrant_emit_is_dropped() {
        static HANDLER: OnceLock<SafeLogHandler> = OnceLock::new();
        static NESTED: OnceLock<Disposition> = OnceLock::new();

        let handler = HANDLER.get_or_init(|| {
            SafeLogHandler::builder(sink_fn(|record: &LogRecord| {
                if record.message() == "outer" {
                    let nested = HANDLER
                        .get()
                        .unwrap()
                        .dispatch(&LogRecord::new(Level::Info, "inner"))?;
                    let _ = NESTED.set(nested);
                }
                Ok(())
            }))
            .init_lock_query(query_fn(|| false))
            .build()
        });

        assert!(handler.handle(&LogRecord::new(Level::Info, "outer")).unwrap());
        assert_eq!(Some(&Disposition::Dropped(DropReason::Reentrant)), NESTED.get());

        let stats = handler.stats();
        assert_eq!(1, stats.emitted);
        assert_eq!(1, stats.dropped_reentrant);
        assert!(stats.lock_balanced());
    }

    //-------------------------------------------------------------------
    // Test: test_config_applies_threshold_and_timeout
    //
    #[test]
    fn test_config_applies_threshold_and_timeout() {
        let config = HandlerConfig {
            level: LevelFilter::Warn,
            block_timeout_ms: Some(5),
        };
        let handler = SafeLogHandler::builder(sink_fn(|_: &LogRecord| Ok(())))
            .config(&config)
            .build();

        assert_eq!(Some(Duration::from_millis(5)), handler.block_timeout());
        assert_eq!(LevelFilter::Warn, handler.filter().max_level());
        assert!(!handler.handle(&LogRecord::new(Level::Debug, "quiet")).unwrap());
        assert!(handler.handle(&LogRecord::new(Level::Error, "loud")).unwrap());
    }

    //-------------------------------------------------------------------
    // Test: test_log_facade_integration
    //
    // Description:
    //  Driving the handler through the log::Log trait filters on level
    //  and swallows emit failures into the stats.
    //
    #[test]
    fn test_log_facade_integration() {
        let handler = SafeLogHandler::builder(sink_fn(|record: &LogRecord| {
            if record.message().contains("fail") {
                Err(EmitError::Transport("unreachable".to_owned()))
            } else {
                Ok(())
            }
        }))
        .filter(Filter::Threshold(LevelFilter::Info))
        .init_lock_query(query_fn(|| false))
        .build();

        let log_at = |level: Level, message: &str| {
            handler.log(
                &log::Record::builder()
                    .level(level)
                    .target("facade")
                    .args(format_args!("{}", message))
                    .build(),
            )
        };

        log_at(Level::Info, "ok");
        log_at(Level::Debug, "too verbose");
        log_at(Level::Error, "fail");
        handler.flush();

        let stats = handler.stats();
        assert_eq!(1, stats.emitted);
        assert_eq!(1, stats.emit_failures);
        assert_eq!(0, stats.rejected);
        assert!(stats.lock_balanced());
    }
}
