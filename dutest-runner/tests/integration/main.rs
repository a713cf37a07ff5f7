// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

mod fixtures;
mod run;
mod stream;
mod streamed_results;
mod timeouts;
