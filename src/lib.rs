// Copyright 2026 Harvester Contributors
// SPDX-License-Identifier: Apache-2.0

//! Reply.io report harvester — drives a real Chromium session to trigger,
//! detect, and capture CSV exports.
//!
//! This library crate exposes the core modules for integration testing.

#![allow(clippy::new_without_default)]

pub mod acquisition;
pub mod cli;
pub mod config;
pub mod driver;
pub mod progress;
pub mod reports;
pub mod server;
pub mod session;
