// Copyright 2019 Brian Gianforcaro

use crate::record::LogRecord;
use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by an emit sink while the flush lock was held.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("emit sink I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("emit sink transport failure: {0}")]
    Transport(String),
}

/// The backend a handler flushes records into.
///
/// `emit` is only ever called with the handler's flush lock held, so a
/// sink sees at most one call at a time per handler. Failures are handed
/// back to the caller and never retried.
pub trait EmitSink: Send + Sync {
    fn emit(&self, record: &LogRecord) -> Result<(), EmitError>;

    fn flush(&self) {}
}

impl<T: EmitSink + ?Sized> EmitSink for Arc<T> {
    fn emit(&self, record: &LogRecord) -> Result<(), EmitError> {
        (**self).emit(record)
    }

    fn flush(&self) {
        (**self).flush()
    }
}

/// Adapter turning a closure into an [`EmitSink`].
pub struct SinkFn<F>(F);

impl<F> EmitSink for SinkFn<F>
where
    F: Fn(&LogRecord) -> Result<(), EmitError> + Send + Sync,
{
    fn emit(&self, record: &LogRecord) -> Result<(), EmitError> {
        (self.0)(record)
    }
}

pub fn sink_fn<F>(emit: F) -> SinkFn<F>
where
    F: Fn(&LogRecord) -> Result<(), EmitError> + Send + Sync,
{
    SinkFn(emit)
}
