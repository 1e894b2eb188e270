// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Contract types shared between `testwrap` and the programs around it.
//!
//! This crate contains:
//!
//! * the documented process exit codes of `testwrap run` ([`TestWrapExitCode`]);
//! * the names of the environment variables a test binary observes ([`env_vars`]);
//! * the machine-readable summary printed with `--message-format json` ([`OutcomeSummary`]).

pub mod env_vars;
mod exit_codes;
mod summary;

pub use exit_codes::*;
pub use summary::*;
