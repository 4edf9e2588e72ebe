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

use std::sync::Arc;

use once_cell::sync::OnceCell;
use snafu::ensure;
use tokio::runtime::Runtime;

use crate::{
    error::{AlreadyInitializedSnafu, Result},
    options::{GlobalRuntimeOptions, RuntimeOptions},
};

static GLOBAL_OPTIONS: OnceCell<GlobalRuntimeOptions> = OnceCell::new();
static BACKGROUND_RUNTIME: OnceCell<Arc<Runtime>> = OnceCell::new();

fn global_options() -> &'static GlobalRuntimeOptions {
    GLOBAL_OPTIONS.get_or_init(GlobalRuntimeOptions::default)
}

/// Set the process-wide runtime options.
///
/// Must run before anything reads them (e.g. before the first wave is
/// configured); later calls fail with `AlreadyInitialized`.
pub fn init_global_runtimes(options: &GlobalRuntimeOptions) -> Result<()> {
    let mut stored = false;
    GLOBAL_OPTIONS.get_or_init(|| {
        stored = true;
        options.clone()
    });
    ensure!(stored, AlreadyInitializedSnafu);
    Ok(())
}

/// Default number of concurrent operations for a wave.
#[must_use]
pub fn default_parallelism() -> usize { global_options().parallelism.max(1) }

/// Shared runtime for work started outside any Tokio context.
///
/// # Panics
/// Panics if the runtime cannot be built on first use.
#[must_use]
pub fn background_runtime() -> Arc<Runtime> {
    BACKGROUND_RUNTIME
        .get_or_init(|| {
            let runtime = RuntimeOptions::builder()
                .thread_name("tidal-bg")
                .worker_threads(global_options().background_threads)
                .build()
                .create()
                .unwrap_or_else(|e| panic!("{e}"));
            Arc::new(runtime)
        })
        .clone()
}
