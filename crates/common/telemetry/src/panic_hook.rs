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

use std::{panic, sync::LazyLock, thread};

use backtrace::Backtrace;
use prometheus::{IntCounter, register_int_counter};

/// Total number of panics observed by the process, including panics that a
/// wave contained to a single session.
pub static PANIC_COUNTER: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("tidal_panic_counter", "Total number of panics").unwrap()
});

/// Log every panic as an `error` event carrying the thread, location and
/// backtrace, count it, then hand it to the previously installed hook.
pub fn set_panic_hook() {
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        PANIC_COUNTER.inc();

        let current = thread::current();
        let thread = current.name().unwrap_or("<unnamed>");
        let (file, line) = info
            .location()
            .map_or(("<unknown>", 0), |location| (location.file(), location.line()));
        let backtrace = Backtrace::new();
        tracing::error!(
            panic = %info,
            thread,
            panic.file = file,
            panic.line = line,
            backtrace = ?backtrace,
            "Panicked"
        );

        previous(info);
    }));
}
