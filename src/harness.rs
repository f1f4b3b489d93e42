// Copyright 2019 Brian Gianforcaro

//! Controllable collaborators for exercising a [`SafeLogHandler`] under
//! the lock orderings that would otherwise deadlock.
//!
//! [`HeldInitSection`] parks a background thread inside an initialization
//! section for as long as a test needs it, and [`ControlledSink`] is an
//! emit sink that can be slowed down, held shut, or made to fail.
//!
//! [`SafeLogHandler`]: crate::SafeLogHandler

use crate::init_lock::GlobalInitLock;
use crate::record::LogRecord;
use crate::sink::{EmitError, EmitSink};
use parking_lot::Mutex;
use rsevents::{Awaitable, ManualResetEvent, State};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A background thread holding an initialization section open.
pub struct HeldInitSection {
    held: Arc<ManualResetEvent>,
    release: Arc<ManualResetEvent>,
    thread: Option<JoinHandle<()>>,
}

impl HeldInitSection {
    /// Spawns a thread that enters a section of `init_lock` and stays
    /// inside until [`release`](Self::release) is called or this value
    /// is dropped.
    pub fn spawn(init_lock: Arc<GlobalInitLock>) -> HeldInitSection {
        let held = Arc::new(ManualResetEvent::new(State::Unset));
        let release = Arc::new(ManualResetEvent::new(State::Unset));

        let thread = {
            let held = Arc::clone(&held);
            let release = Arc::clone(&release);
            thread::spawn(move || {
                let _section = init_lock.enter();
                held.set();
                release.wait();
            })
        };

        HeldInitSection {
            held,
            release,
            thread: Some(thread),
        }
    }

    /// Waits until the background thread is inside its section.
    pub fn wait_until_held(&self, timeout: Duration) -> bool {
        self.held.wait_for(timeout)
    }

    /// Lets the background thread leave its section and joins it.
    pub fn release(mut self) {
        self.release_and_join();
    }

    fn release_and_join(&mut self) {
        self.release.set();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for HeldInitSection {
    fn drop(&mut self) {
        self.release_and_join();
    }
}

/// An emit sink whose timing and outcome are driven by the test.
pub struct ControlledSink {
    delay: Duration,
    gate: ManualResetEvent,
    started: ManualResetEvent,
    fail_next: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    emitted: Mutex<Vec<String>>,
}

impl ControlledSink {
    /// A sink that emits immediately.
    pub fn new() -> ControlledSink {
        ControlledSink::with_delay(Duration::from_millis(0))
    }

    /// A sink that sleeps for `delay` inside every emit.
    pub fn with_delay(delay: Duration) -> ControlledSink {
        ControlledSink {
            delay,
            gate: ManualResetEvent::new(State::Set),
            started: ManualResetEvent::new(State::Unset),
            fail_next: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            emitted: Mutex::new(Vec::new()),
        }
    }

    /// Makes subsequent emits hang until [`open`](Self::open).
    pub fn close(&self) {
        self.gate.reset();
    }

    pub fn open(&self) {
        self.gate.set();
    }

    /// The next emit returns a transport error instead of recording.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Waits until some emit call has begun.
    pub fn wait_until_started(&self, timeout: Duration) -> bool {
        self.started.wait_for(timeout)
    }

    /// Messages of successfully emitted records, in emission order.
    pub fn emitted(&self) -> Vec<String> {
        self.emitted.lock().clone()
    }

    /// The highest number of emit calls ever observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for ControlledSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EmitSink for ControlledSink {
    fn emit(&self, record: &LogRecord) -> Result<(), EmitError> {
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        self.started.set();

        self.gate.wait();
        if self.delay > Duration::from_millis(0) {
            thread::sleep(self.delay);
        }

        let result = if self.fail_next.swap(false, Ordering::SeqCst) {
            Err(EmitError::Transport(format!(
                "injected failure for {:?}",
                record.message()
            )))
        } else {
            self.emitted.lock().push(record.message().to_owned());
            Ok(())
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
