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

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use tidal_wave::{Plugin, WaveContext};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Per-sweep success and failure counts shared by the session plugin and
/// [`SummaryPlugin`].
#[derive(Debug, Default)]
pub struct Outcomes {
    succeeded: AtomicUsize,
    failed:    AtomicUsize,
}

impl Outcomes {
    fn record(&self, ok: bool) {
        let counter = if ok { &self.succeeded } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and reset the counts.
    fn take(&self) -> (usize, usize) {
        (
            self.succeeded.swap(0, Ordering::Relaxed),
            self.failed.swap(0, Ordering::Relaxed),
        )
    }
}

/// Runs a shell command per item, with every `{}` replaced by the item.
pub struct ExecPlugin {
    template: String,
    timeout:  Duration,
    outcomes: Arc<Outcomes>,
}

impl ExecPlugin {
    pub const fn new(template: String, timeout: Duration, outcomes: Arc<Outcomes>) -> Self {
        ExecPlugin {
            template,
            timeout,
            outcomes,
        }
    }

    fn command_for(&self, item: &str) -> String { self.template.replace("{}", item) }
}

#[async_trait::async_trait]
impl Plugin for ExecPlugin {
    fn name(&self) -> &'static str { "exec" }

    async fn session(&self, ctx: &WaveContext, item: &str) {
        let command = self.command_for(item);
        let run = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .kill_on_drop(true)
            .output();

        let ok = match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) if output.status.success() => {
                debug!(wave = ctx.name(), item, "Command succeeded");
                true
            }
            Ok(Ok(output)) => {
                warn!(
                    wave = ctx.name(),
                    item,
                    status = %output.status,
                    stderr = %String::from_utf8_lossy(&output.stderr).trim_end(),
                    "Command failed"
                );
                false
            }
            Ok(Err(e)) => {
                warn!(wave = ctx.name(), item, error = %e, "Failed to spawn command");
                false
            }
            Err(_) => {
                warn!(wave = ctx.name(), item, timeout = ?self.timeout, "Command timed out");
                false
            }
        };
        self.outcomes.record(ok);
    }
}

/// Logs each item; the session used when no command is given.
pub struct EchoPlugin {
    outcomes: Arc<Outcomes>,
}

impl EchoPlugin {
    pub const fn new(outcomes: Arc<Outcomes>) -> Self { EchoPlugin { outcomes } }
}

#[async_trait::async_trait]
impl Plugin for EchoPlugin {
    fn name(&self) -> &'static str { "echo" }

    async fn session(&self, ctx: &WaveContext, item: &str) {
        info!(wave = ctx.name(), sweep = ctx.sweep(), item, "Visited");
        self.outcomes.record(true);
    }
}

/// Logs the outcome of every sweep at its end.
pub struct SummaryPlugin {
    outcomes: Arc<Outcomes>,
}

impl SummaryPlugin {
    pub const fn new(outcomes: Arc<Outcomes>) -> Self { SummaryPlugin { outcomes } }
}

#[async_trait::async_trait]
impl Plugin for SummaryPlugin {
    fn name(&self) -> &'static str { "summary" }

    async fn init(&self, ctx: &WaveContext) {
        info!(
            wave = ctx.name(),
            items = ctx.items().len(),
            concurrency = ctx.concurrency(),
            repeat = ctx.repeat(),
            "Sweeping"
        );
    }

    async fn pause(&self, ctx: &WaveContext) { info!(wave = ctx.name(), "Paused"); }

    async fn unpause(&self, ctx: &WaveContext) { info!(wave = ctx.name(), "Resumed"); }

    async fn end(&self, ctx: &WaveContext) {
        let (succeeded, failed) = self.outcomes.take();
        info!(wave = ctx.name(), sweep = ctx.sweep(), succeeded, failed, "Sweep finished");
    }

    /// Counting happens in the session plugins.
    async fn session(&self, _ctx: &WaveContext, _item: &str) {}
}
