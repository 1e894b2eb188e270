// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for `testwrap`, the process that runs one test target on behalf of a
//! build orchestrator.
//!
//! The flow for a target is:
//!
//! 1. [`runfiles`]: resolve the declared runtime dependencies into a manifest (and optionally a
//!    materialized tree).
//! 2. [`shard`]: plan one invocation per shard and run them concurrently.
//! 3. [`environment`] and [`scratch`]: give each invocation a fresh scratch directory and a
//!    hermetic environment.
//! 4. [`launcher`]: spawn the test, capture its output and enforce the timeout.
//! 5. [`outcome`]: map each invocation to a verdict, and reduce them to one verdict for the
//!    target.
//!
//! [`runner::TestRunner`] ties these together.

pub mod config;
pub mod environment;
pub mod errors;
pub mod helpers;
pub mod launcher;
pub mod outcome;
pub mod reports;
pub mod runfiles;
pub mod runner;
pub mod scratch;
pub mod shard;
mod stopwatch;
pub mod target;
mod test_command;
pub mod test_output;
