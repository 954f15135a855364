/*
 *   Copyright (c) 2025 R3BL LLC
 *   All rights reserved.
 *
 *   Licensed under the Apache License, Version 2.0 (the "License");
 *   you may not use this file except in compliance with the License.
 *   You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 *   Unless required by applicable law or agreed to in writing, software
 *   distributed under the License is distributed on an "AS IS" BASIS,
 *   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *   See the License for the specific language governing permissions and
 *   limitations under the License.
 */

//! # givebox
//!
//! A kiosk-style charitable-voting appliance, fully async on tokio. Category
//! buttons and a coin validator produce edge events on hardware callback
//! threads; the pipeline debounces and correlates them into donations against
//! the currently active poll, persists them transactionally (SQLite via
//! sqlx), and streams JSON envelopes to connected display clients.
//!
//! The pipeline, end to end:
//!
//! ```text
//! pins (callback threads)
//!   └─ EventTap::enqueue ──► bounded bridge ──► EventDispatcher (one task)
//!                                                  └─► component handlers
//!                                                        └─► CorrelationEngine (actor)
//!                                                              ├─► DonationWriter (one tx per commit)
//!                                                              └─► BroadcastHub ──► display clients
//! ```
//!
//! Concurrency is deliberately narrow: the bridge is the only cross-thread
//! hand-off, the hub's subscriber set is the only lock, and every correlation
//! slot mutation happens inside one actor task.

// https://github.com/rust-lang/rust-clippy
// https://rust-lang.github.io/rust-clippy/master/index.html
#![warn(clippy::all)]
#![warn(rust_2018_idioms)]

/// Gates chatty per-edge logging in the GPIO modules.
pub const DEBUG_GPIO_MOD: bool = false;

/// Gates per-signal logging in the correlation engine.
pub const DEBUG_CORRELATE_MOD: bool = false;

pub mod broadcast;
pub mod clock;
pub mod config;
pub mod container;
pub mod correlate;
pub mod donate;
pub mod gpio;
pub mod launcher;
pub mod log;
pub mod store;
pub mod test_fixtures;

pub use broadcast::*;
pub use clock::*;
pub use config::*;
pub use container::*;
pub use correlate::*;
pub use donate::*;
pub use gpio::*;
pub use store::*;
