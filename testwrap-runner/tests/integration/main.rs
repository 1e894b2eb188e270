// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests that run real test programs through the runner. These use `/bin/sh`
//! scripts, so they only run on Unix.

#![cfg(unix)]

mod basic;
mod fixtures;
mod outputs;
mod sharding;
