// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test sharding.
//!
//! A sharded target is run as `N` independent invocations of the same test binary, each told
//! its index and the total through the environment. The test binary decides which subset of
//! its tests to run; the wrapper only launches the invocations concurrently and collects their
//! results.

use crate::{
    errors::{ChildStartError, ShardTotalParseError},
    outcome::InvocationResult,
    runner::PreparedTarget,
    stopwatch::stopwatch,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::{fmt, future::Future, num::NonZeroU32, str::FromStr, sync::Arc};
use tokio::sync::{Semaphore, mpsc};
use tracing::debug;

/// The total number of shards for a target. Always at least 1.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ShardTotal(NonZeroU32);

impl ShardTotal {
    /// A single, unsharded invocation.
    pub const ONE: Self = Self(NonZeroU32::MIN);

    /// Creates a new `ShardTotal`, returning `None` if `total` is 0.
    pub fn new(total: u32) -> Option<Self> {
        NonZeroU32::new(total).map(Self)
    }

    /// Returns the total as an integer.
    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Returns true if there is more than one shard.
    pub fn is_sharded(self) -> bool {
        self.get() > 1
    }
}

impl Default for ShardTotal {
    fn default() -> Self {
        Self::ONE
    }
}

impl fmt::Display for ShardTotal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ShardTotal {
    type Err = ShardTotalParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let total: u32 = s
            .parse()
            .map_err(|err| ShardTotalParseError::new(s, format!("{err}")))?;
        Self::new(total).ok_or_else(|| ShardTotalParseError::new(s, "must be at least 1"))
    }
}

/// One invocation slot: a 0-based index and the total.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ShardSlot {
    index: u32,
    total: ShardTotal,
}

impl ShardSlot {
    /// Creates a new slot.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not less than `total`.
    pub fn new(index: u32, total: ShardTotal) -> Self {
        assert!(
            index < total.get(),
            "shard index {index} out of range for total {total}"
        );
        Self { index, total }
    }

    /// The slot of an unsharded target.
    pub const UNSHARDED: Self = Self {
        index: 0,
        total: ShardTotal::ONE,
    };

    /// Returns the 0-based index.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Returns the total number of shards.
    pub fn total(self) -> ShardTotal {
        self.total
    }

    /// Returns true if this slot belongs to a sharded target.
    pub fn is_sharded(self) -> bool {
        self.total.is_sharded()
    }

    /// The directory name used for this shard's outputs in a logs directory.
    pub fn logs_dir_name(self) -> String {
        format!("shard_{}_of_{}", self.index + 1, self.total)
    }
}

impl fmt::Display for ShardSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard {}/{}", self.index + 1, self.total)
    }
}

/// The slots a sharded target is run as.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ShardPlan {
    total: ShardTotal,
}

impl ShardPlan {
    /// Plans `total` slots.
    pub fn new(total: ShardTotal) -> Self {
        Self { total }
    }

    /// Returns the total number of shards.
    pub fn total(&self) -> ShardTotal {
        self.total
    }

    /// Returns exactly `total` slots with distinct indices `0..total`, in order.
    pub fn slots(&self) -> impl Iterator<Item = ShardSlot> + '_ {
        (0..self.total.get()).map(|index| ShardSlot::new(index, self.total))
    }
}

/// The lifecycle of a shard, tracked for logging.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ShardState {
    /// The slot exists but its task hasn't acquired a permit yet.
    Planned,
    /// The shard's process is being set up or is running.
    Running,
    /// The shard has a result.
    Completed,
}

/// The file a test may write to confirm it understood sharding.
///
/// Its parent directory exists before the child starts. The wrapper never creates the file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShardStatusChannel {
    path: Utf8PathBuf,
}

impl ShardStatusChannel {
    pub(crate) const FILE_NAME: &'static str = "status";

    /// Creates the channel's parent directory `dir`.
    pub(crate) fn prepare(dir: Utf8PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join(Self::FILE_NAME),
        })
    }

    /// Returns the path of the status file.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns true if the test created the status file.
    pub fn was_touched(&self) -> bool {
        self.path.exists()
    }
}

/// One execution attempt: a shard slot of a prepared target.
///
/// Created once per slot by [`ShardCoordinator`], owned by the task that runs it.
#[derive(Clone, Debug)]
pub struct TestInvocation {
    slot: ShardSlot,
    target: Arc<PreparedTarget>,
}

impl TestInvocation {
    pub(crate) fn new(slot: ShardSlot, target: Arc<PreparedTarget>) -> Self {
        Self { slot, target }
    }

    /// Returns the slot of this invocation.
    pub fn slot(&self) -> ShardSlot {
        self.slot
    }

    /// Returns the path of the executable to run.
    pub fn program(&self) -> &Utf8Path {
        &self.target.program
    }

    /// Returns the arguments passed to the executable.
    pub fn args(&self) -> &[String] {
        &self.target.args
    }

    /// Returns the timeout for this invocation, if any.
    pub fn timeout(&self) -> Option<std::time::Duration> {
        self.target.timeout
    }

    pub(crate) fn target(&self) -> &PreparedTarget {
        &self.target
    }
}

/// Runs the shards of a plan concurrently and collects their results.
#[derive(Clone, Debug)]
pub struct ShardCoordinator {
    max_concurrent: usize,
}

impl ShardCoordinator {
    /// Creates a coordinator that runs at most `max_concurrent` shards at once.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Runs `run_shard` once per slot of `plan` and returns the results ordered by index.
    ///
    /// Every shard runs to completion: a failing or timed-out shard never cancels its
    /// siblings. A task that panics is reported as an infrastructure error for its slot.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn run<F, Fut>(&self, plan: ShardPlan, run_shard: F) -> Vec<InvocationResult>
    where
        F: Fn(ShardSlot) -> Fut,
        Fut: Future<Output = InvocationResult> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel();

        for slot in plan.slots() {
            debug!(%slot, state = ?ShardState::Planned, "shard planned");
            let fut = run_shard(slot);
            let semaphore = semaphore.clone();
            let result_tx = result_tx.clone();
            tokio::spawn(async move {
                // The semaphore is never closed, so acquiring only fails if it were.
                let _permit = semaphore.acquire_owned().await;
                debug!(%slot, state = ?ShardState::Running, "shard started");
                let result = fut.await;
                debug!(
                    %slot,
                    state = ?ShardState::Completed,
                    verdict = %result.verdict(),
                    "shard finished",
                );
                // The receiver outlives every task.
                _ = result_tx.send((slot.index(), result));
            });
        }
        drop(result_tx);

        let mut results: Vec<Option<InvocationResult>> =
            (0..plan.total().get()).map(|_| None).collect();
        while let Some((index, result)) = result_rx.recv().await {
            results[index as usize] = Some(result);
        }

        // A task that dropped its sender without sending panicked.
        let start = stopwatch().snapshot();
        results
            .into_iter()
            .zip(plan.slots())
            .map(|(result, slot)| {
                result.unwrap_or_else(|| {
                    debug!(%slot, "shard task panicked");
                    InvocationResult::start_failed(
                        slot,
                        ChildStartError::TaskPanicked,
                        start.start_time,
                        start.duration,
                    )
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{ExecutionResult, Verdict};
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use test_case::test_case;

    #[test_case("1", Some(1); "one")]
    #[test_case("8", Some(8); "eight")]
    #[test_case("0", None; "zero")]
    #[test_case("-1", None; "negative")]
    #[test_case("two", None; "not a number")]
    fn parse_shard_total(input: &str, expected: Option<u32>) {
        let parsed = input.parse::<ShardTotal>().ok().map(ShardTotal::get);
        assert_eq!(parsed, expected);
    }

    #[test]
    fn plan_yields_distinct_slots() {
        let plan = ShardPlan::new(ShardTotal::new(3).unwrap());
        let slots: Vec<_> = plan.slots().collect();
        assert_eq!(slots.len(), 3);
        let indices: Vec<_> = slots.iter().map(|slot| slot.index()).collect();
        assert_eq!(indices, [0, 1, 2]);
        assert!(slots.iter().all(|slot| slot.total().get() == 3));
        assert_eq!(slots[1].logs_dir_name(), "shard_2_of_3");
        assert_eq!(slots[1].to_string(), "shard 2/3");
    }

    #[test]
    #[should_panic = "out of range"]
    fn slot_index_out_of_range() {
        ShardSlot::new(2, ShardTotal::new(2).unwrap());
    }

    #[test]
    fn status_channel_parent_exists() {
        let dir = camino_tempfile::tempdir().unwrap();
        let channel = ShardStatusChannel::prepare(dir.path().join("shard")).unwrap();
        assert!(channel.path().parent().unwrap().is_dir());
        assert!(!channel.was_touched(), "the wrapper never creates the file");
    }

    fn dummy_result(slot: ShardSlot, result: ExecutionResult) -> InvocationResult {
        InvocationResult {
            slot,
            result,
            output: Default::default(),
            start_time: chrono::Local::now().fixed_offset(),
            duration: Duration::ZERO,
            fd_errors: Vec::new(),
            report_errors: Vec::new(),
            scratch_dir: None,
        }
    }

    #[tokio::test]
    async fn coordinator_orders_results_and_limits_concurrency() {
        let plan = ShardPlan::new(ShardTotal::new(4).unwrap());
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let results = ShardCoordinator::new(2)
            .run(plan, |slot| {
                let running = running.clone();
                let max_seen = max_seen.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    // Later shards finish first.
                    tokio::time::sleep(Duration::from_millis(40 - 10 * slot.index() as u64)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    dummy_result(slot, ExecutionResult::Pass)
                }
            })
            .await;

        let indices: Vec<_> = results.iter().map(|r| r.slot().index()).collect();
        assert_eq!(indices, [0, 1, 2, 3]);
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn panicking_shard_is_infrastructure_error() {
        let plan = ShardPlan::new(ShardTotal::new(2).unwrap());
        let results = ShardCoordinator::new(2)
            .run(plan, |slot| async move {
                if slot.index() == 1 {
                    panic!("shard 1 panicked");
                }
                dummy_result(slot, ExecutionResult::Pass)
            })
            .await;

        assert_eq!(results[0].verdict(), Verdict::Pass);
        assert_eq!(results[1].verdict(), Verdict::InfrastructureError);
        assert_eq!(results[1].slot().index(), 1);
    }
}
