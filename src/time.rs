// Copyright (c) The casecore Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wall-clock timestamps for execution start/end, backed by a monotonic clock for durations.
//!
//! We track both a [`std::time::SystemTime`] (for the timestamp a store or report wants to show)
//! and an [`std::time::Instant`] (for the duration, which must never go backwards even if the
//! system clock is adjusted mid-run).

use std::time::{Duration, Instant, SystemTime};

/// A point in time at which something started, capable of producing an elapsed [`Duration`].
#[derive(Clone, Copy, Debug)]
pub struct Timestamp {
    wall: SystemTime,
    instant: Instant,
}

impl Timestamp {
    pub fn now() -> Self {
        Self {
            wall: SystemTime::now(),
            instant: Instant::now(),
        }
    }

    /// The wall-clock time this timestamp was taken at.
    pub fn wall(&self) -> SystemTime {
        self.wall
    }

    /// Duration elapsed between this timestamp and `other`, which must be later.
    pub fn elapsed_until(&self, other: Timestamp) -> Duration {
        other.instant.saturating_duration_since(self.instant)
    }

    /// Duration elapsed between this timestamp and now.
    pub fn elapsed(&self) -> Duration {
        self.instant.elapsed()
    }
}
