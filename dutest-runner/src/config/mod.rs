// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for dutest.
//!
//! Configuration is read from a built-in default config, overlaid with `.config/dutest.toml` in
//! the workspace root (or a file passed in explicitly). Settings are grouped into profiles.

mod config_impl;
mod heartbeat;

pub use config_impl::*;
