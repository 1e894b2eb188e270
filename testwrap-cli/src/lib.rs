// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The `testwrap` command: runs one test target on behalf of a build orchestrator.
//!
//! `testwrap run` resolves the target's runfiles, runs every shard in a hermetic environment
//! and exits with a code describing the aggregated verdict (see
//! [`TestWrapExitCode`](testwrap_metadata::TestWrapExitCode)).

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;
mod reporter;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputContext;
