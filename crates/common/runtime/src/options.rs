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
    sync::atomic::{AtomicUsize, Ordering},
    thread::available_parallelism,
};

use bon::Builder;
use smart_default::SmartDefault;
use snafu::ResultExt;
use tokio::runtime::Runtime;

use crate::error::{BuildSnafu, Result};

/// Process-wide runtime settings, read once at process initialization.
#[derive(Debug, Clone, SmartDefault, Builder)]
#[builder(finish_fn = build)]
pub struct GlobalRuntimeOptions {
    /// Worker threads of the shared background runtime.
    #[default(background_threads())]
    #[builder(default = background_threads())]
    pub background_threads: usize,

    /// Number of concurrent operations a wave uses when its configuration
    /// does not say otherwise.
    #[default(cpu_threads())]
    #[builder(default = cpu_threads())]
    pub parallelism: usize,
}

/// Shape of one multi-thread Tokio runtime.
#[derive(Debug, Clone, SmartDefault, Builder)]
#[builder(finish_fn = build)]
pub struct RuntimeOptions {
    /// Defaults to the number of CPUs.
    pub worker_threads: Option<usize>,

    /// Threads are named `{thread_name}-{index}`.
    #[default("tidal-rt".to_string())]
    #[builder(default = "tidal-rt".to_string(), into)]
    pub thread_name: String,

    #[default(true)]
    #[builder(default = true)]
    pub enable_io: bool,

    #[default(true)]
    #[builder(default = true)]
    pub enable_time: bool,
}

impl RuntimeOptions {
    pub fn create(self) -> Result<Runtime> {
        let Self {
            worker_threads,
            thread_name,
            enable_io,
            enable_time,
        } = self;

        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.worker_threads(worker_threads.unwrap_or_else(cpu_threads).max(1));
        if enable_io {
            builder.enable_io();
        }
        if enable_time {
            builder.enable_time();
        }

        let prefix = thread_name.clone();
        let next_index = AtomicUsize::new(0);
        builder.thread_name_fn(move || {
            format!("{prefix}-{}", next_index.fetch_add(1, Ordering::Relaxed))
        });

        builder.build().context(BuildSnafu { name: thread_name })
    }
}

pub(crate) fn cpu_threads() -> usize {
    available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1)
        .max(1)
}

/// Leave one core to the caller's own runtime.
pub(crate) fn background_threads() -> usize { cpu_threads().saturating_sub(1).max(1) }
