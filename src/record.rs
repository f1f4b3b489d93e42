// Copyright 2019 Brian Gianforcaro

use log::{Level, LevelFilter};
use std::fmt;
use std::time::SystemTime;

/// One log event. Read-only to the handler.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    level: Level,
    target: String,
    message: String,
    timestamp: SystemTime,
    payload: Option<Vec<u8>>,
}

impl LogRecord {
    /// Creates a record stamped with the current time.
    pub fn new<M: Into<String>>(level: Level, message: M) -> LogRecord {
        LogRecord {
            level,
            target: String::new(),
            message: message.into(),
            timestamp: SystemTime::now(),
            payload: None,
        }
    }

    pub fn with_target<T: Into<String>>(mut self, target: T) -> LogRecord {
        self.target = target.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> LogRecord {
        self.timestamp = timestamp;
        self
    }

    /// Attaches bytes the handler carries through to the sink untouched.
    pub fn with_payload(mut self, payload: Vec<u8>) -> LogRecord {
        self.payload = Some(payload);
        self
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn payload(&self) -> Option<&[u8]> {
        self.payload.as_deref()
    }
}

impl<'a> From<&log::Record<'a>> for LogRecord {
    fn from(record: &log::Record<'a>) -> LogRecord {
        LogRecord::new(record.level(), record.args().to_string()).with_target(record.target())
    }
}

/// Decides whether a record should be emitted at all.
pub enum Filter {
    AllowAll,
    /// Accepts records at or more severe than the threshold.
    Threshold(LevelFilter),
    Custom(Box<dyn Fn(&LogRecord) -> bool + Send + Sync>),
}

impl Filter {
    pub fn custom<F>(predicate: F) -> Filter
    where
        F: Fn(&LogRecord) -> bool + Send + Sync + 'static,
    {
        Filter::Custom(Box::new(predicate))
    }

    pub fn accepts(&self, record: &LogRecord) -> bool {
        match self {
            Filter::AllowAll => true,
            Filter::Threshold(threshold) => record.level() <= *threshold,
            Filter::Custom(predicate) => predicate(record),
        }
    }

    /// The most verbose level this filter could possibly accept.
    pub fn max_level(&self) -> LevelFilter {
        match self {
            Filter::Threshold(threshold) => *threshold,
            Filter::AllowAll | Filter::Custom(_) => LevelFilter::Trace,
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::AllowAll
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::AllowAll => f.write_str("AllowAll"),
            Filter::Threshold(threshold) => f.debug_tuple("Threshold").field(threshold).finish(),
            Filter::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
