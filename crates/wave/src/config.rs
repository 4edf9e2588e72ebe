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

use std::{sync::Arc, time::Duration};

use snafu::ensure;
use tidal_common_runtime::Runtime;
use tokio::runtime::Handle;

use crate::err::{InvalidConfigurationSnafu, Result};

/// Configuration of a wave.
///
/// Built with [`WaveConfig::builder`]. Values are checked when the wave
/// starts, not when they are set. A running sweep works on a frozen copy, so
/// changes made through [`Wave::configure`](crate::Wave::configure) apply
/// from the next sweep on.
#[derive(Debug, Clone, bon::Builder)]
pub struct WaveConfig {
    /// Work items, usually host names, processed in this order.
    #[builder(default, into)]
    items: Vec<String>,

    /// Number of workers per sweep. Defaults to the process-wide
    /// parallelism setting.
    #[builder(default = tidal_common_runtime::default_parallelism())]
    concurrency: usize,

    /// Pause between the end of one sweep and the start of the next.
    #[builder(default)]
    wait_interval: Duration,

    /// Run sweeps back to back until stopped.
    #[builder(default)]
    repeat: bool,

    /// Label used in logs and metrics. Generated from the wave id when unset.
    #[builder(into)]
    name: Option<String>,

    /// Runtime the wave's tasks are spawned on. Falls back to the ambient
    /// runtime, then to the shared background runtime.
    #[builder(into)]
    runtime: Option<Arc<Runtime>>,
}

impl Default for WaveConfig {
    fn default() -> Self { Self::builder().build() }
}

impl WaveConfig {
    #[must_use]
    pub fn items(&self) -> &[String] { &self.items }

    #[must_use]
    pub const fn concurrency(&self) -> usize { self.concurrency }

    #[must_use]
    pub const fn wait_interval(&self) -> Duration { self.wait_interval }

    #[must_use]
    pub const fn repeat(&self) -> bool { self.repeat }

    #[must_use]
    pub fn name(&self) -> Option<&str> { self.name.as_deref() }

    pub fn set_items(&mut self, items: impl Into<Vec<String>>) -> &mut Self {
        self.items = items.into();
        self
    }

    pub const fn set_concurrency(&mut self, concurrency: usize) -> &mut Self {
        self.concurrency = concurrency;
        self
    }

    pub const fn set_wait_interval(&mut self, wait_interval: Duration) -> &mut Self {
        self.wait_interval = wait_interval;
        self
    }

    pub const fn set_repeat(&mut self, repeat: bool) -> &mut Self {
        self.repeat = repeat;
        self
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = Some(name.into());
        self
    }

    pub(crate) fn name_or_default(&mut self, fallback: impl FnOnce() -> String) {
        if self.name.is_none() {
            self.name = Some(fallback());
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        ensure!(
            self.concurrency >= 1,
            InvalidConfigurationSnafu {
                reason: "concurrency must be at least 1",
            }
        );
        ensure!(
            self.name.as_deref().is_some_and(|name| !name.is_empty()),
            InvalidConfigurationSnafu {
                reason: "name must not be empty",
            }
        );
        Ok(())
    }

    /// Buffer size of the work queue; feeding is never the bottleneck.
    pub(crate) const fn queue_capacity(&self) -> usize { self.concurrency.saturating_mul(3) }

    pub(crate) fn spawn_handle(&self) -> Handle {
        self.runtime.as_ref().map_or_else(
            || {
                Handle::try_current()
                    .unwrap_or_else(|_| tidal_common_runtime::background_runtime().handle().clone())
            },
            |runtime| runtime.handle().clone(),
        )
    }
}
