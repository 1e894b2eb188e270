// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Timing for runs and shards.
//!
//! Start times come from the realtime clock and durations from the monotonic clock, so a
//! reported duration never goes backwards if the system clock is adjusted mid-run.

use chrono::{DateTime, FixedOffset, Local};
use std::time::{Duration, Instant};

pub(crate) fn stopwatch() -> StopwatchStart {
    StopwatchStart {
        start_time: Local::now().fixed_offset(),
        instant: Instant::now(),
    }
}

#[derive(Clone, Debug)]
pub(crate) struct StopwatchStart {
    start_time: DateTime<FixedOffset>,
    instant: Instant,
}

impl StopwatchStart {
    pub(crate) fn snapshot(&self) -> StopwatchSnapshot {
        StopwatchSnapshot {
            start_time: self.start_time,
            duration: self.instant.elapsed(),
        }
    }
}

/// The start time of a stopwatch and the time elapsed since.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StopwatchSnapshot {
    pub(crate) start_time: DateTime<FixedOffset>,
    pub(crate) duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshots_share_start_time() {
        let start = stopwatch();
        let first = start.snapshot();
        std::thread::sleep(Duration::from_millis(20));
        let second = start.snapshot();

        assert_eq!(first.start_time, second.start_time);
        assert!(
            second.duration >= first.duration + Duration::from_millis(20),
            "second snapshot ({:?}) is at least 20ms after the first ({:?})",
            second.duration,
            first.duration,
        );
    }
}
