// Copyright 2019 Brian Gianforcaro

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Construction-time settings for a [`SafeLogHandler`](crate::SafeLogHandler).
///
/// Missing fields fall back to an allow-everything level and an unbounded
/// blocking acquisition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    pub level: LevelFilter,
    pub block_timeout_ms: Option<u64>,
}

impl HandlerConfig {
    pub fn block_timeout(&self) -> Option<Duration> {
        self.block_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        HandlerConfig {
            level: LevelFilter::Trace,
            block_timeout_ms: None,
        }
    }
}
