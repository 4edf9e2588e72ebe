// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bounded-concurrency wave runner.
//!
//! A wave sweeps a fixed list of items (typically host names) through a
//! small pool of workers, calling a set of plugins once per item:
//! - **Bounded concurrency**: at most `concurrency` sessions run at a time
//! - **Repeat loop**: optionally sweep again after a wait interval, forever
//! - **Pause/Resume**: workers finish their current item, then park
//! - **Plugin hooks**: `init`, `start`, `session`, `pause`, `unpause`,
//!   `end`, with lifecycle hooks never overlapping each other
//! - **Completion fan-out**: per-sweep summaries and a one-shot stop notice
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use tidal_wave::{Plugin, Wave, WaveConfig, WaveContext};
//!
//! struct Probe;
//!
//! #[async_trait::async_trait]
//! impl Plugin for Probe {
//!     async fn session(&self, ctx: &WaveContext, host: &str) {
//!         println!("sweep {} probing {host}", ctx.sweep());
//!     }
//!
//!     async fn end(&self, ctx: &WaveContext) {
//!         println!("sweep {} done", ctx.sweep());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> tidal_wave::Result<()> {
//!     let hosts: Vec<String> = (0..500).map(|i| format!("server-{i}")).collect();
//!     let wave = Wave::new(
//!         WaveConfig::builder()
//!             .items(hosts)
//!             .concurrency(20)
//!             .repeat(true)
//!             .wait_interval(Duration::from_secs(30))
//!             .name("canary")
//!             .build(),
//!     );
//!     wave.add_plugin(Arc::new(Probe));
//!
//!     let mut sweeps = wave.start().await?;
//!     while let Some(summary) = sweeps.next().await {
//!         println!("{} sessions in {:?}", summary.sessions, summary.elapsed);
//!         if summary.sweep == 3 {
//!             wave.stop().await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - [`Wave`]: public handle owning configuration, plugins and lifecycle
//! - [`Plugin`]: hook trait; [`FnPlugin`] adapts an async closure
//! - [`WaveContext`]: read-only view passed to every hook
//! - [`Sweeps`], [`Wave::after_each`], [`Wave::on_stop`]: completion
//!   listeners

mod config;
mod context;
mod controller;
mod err;
mod fanout;
mod id;
mod metrics;
mod plugin;
mod queue;
mod wave;
mod worker;

pub use config::WaveConfig;
pub use context::WaveContext;
pub use err::{Result, WaveError};
pub use fanout::{Completion, StopReason, SweepSummary, Sweeps};
pub use id::WaveId;
pub use plugin::{FnPlugin, Plugin};
pub use wave::Wave;
