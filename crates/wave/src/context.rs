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
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use crate::{config::WaveConfig, id::WaveId};

/// Read-only view of a wave handed to every plugin hook.
#[derive(Clone)]
pub struct WaveContext {
    id:     WaveId,
    name:   Arc<str>,
    sweep:  u64,
    config: Arc<WaveConfig>,
    paused: Arc<AtomicBool>,
}

impl WaveContext {
    pub(crate) fn new(
        id: WaveId,
        name: Arc<str>,
        sweep: u64,
        config: Arc<WaveConfig>,
        paused: Arc<AtomicBool>,
    ) -> Self {
        WaveContext {
            id,
            name,
            sweep,
            config,
            paused,
        }
    }

    pub fn id(&self) -> WaveId { self.id }

    pub fn name(&self) -> &str { &self.name }

    /// One-based number of the sweep the hook belongs to. Zero for hooks
    /// fired before the first sweep began, such as `init`.
    pub fn sweep(&self) -> u64 { self.sweep }

    pub fn concurrency(&self) -> usize { self.config.concurrency() }

    pub fn items(&self) -> &[String] { self.config.items() }

    pub fn repeat(&self) -> bool { self.config.repeat() }

    pub fn wait_interval(&self) -> Duration { self.config.wait_interval() }

    /// Best-effort snapshot of the wave's paused flag.
    pub fn is_paused(&self) -> bool { self.paused.load(Ordering::Acquire) }
}

impl std::fmt::Debug for WaveContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaveContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("sweep", &self.sweep)
            .field("concurrency", &self.config.concurrency())
            .field("items", &self.config.items().len())
            .finish_non_exhaustive()
    }
}
