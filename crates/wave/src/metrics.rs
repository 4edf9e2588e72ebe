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

use std::sync::LazyLock;

use prometheus::{
    HistogramVec, IntCounterVec, IntGaugeVec, register_histogram_vec, register_int_counter_vec,
    register_int_gauge_vec,
};

pub const WAVE_LABEL: &str = "wave";

pub static WAVE_SWEEPS_STARTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "wave_sweeps_started_total",
        "Total number of sweeps started",
        &[WAVE_LABEL]
    )
    .unwrap()
});

pub static WAVE_SWEEPS_COMPLETED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "wave_sweeps_completed_total",
        "Total number of sweeps that processed every item",
        &[WAVE_LABEL]
    )
    .unwrap()
});

pub static WAVE_SWEEPS_ABORTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "wave_sweeps_aborted_total",
        "Total number of sweeps abandoned by a stop request",
        &[WAVE_LABEL]
    )
    .unwrap()
});

pub static WAVE_SESSIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "wave_sessions_total",
        "Total number of items run through the session hook chain",
        &[WAVE_LABEL]
    )
    .unwrap()
});

pub static WAVE_SESSION_PANICS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "wave_session_panics_total",
        "Total number of session hook chains that panicked",
        &[WAVE_LABEL]
    )
    .unwrap()
});

pub static WAVE_PAUSED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "wave_paused_total",
        "Total number of times waves were paused",
        &[WAVE_LABEL]
    )
    .unwrap()
});

pub static WAVE_RESUMED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!(
        "wave_resumed_total",
        "Total number of times waves were resumed",
        &[WAVE_LABEL]
    )
    .unwrap()
});

pub static WAVE_WORKERS_ACTIVE: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    register_int_gauge_vec!(
        "wave_workers_active",
        "Number of workers of the current sweep that have not terminated",
        &[WAVE_LABEL]
    )
    .unwrap()
});

pub static WAVE_SESSION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "wave_session_duration_seconds",
        "Duration of one item's session hook chain in seconds",
        &[WAVE_LABEL]
    )
    .unwrap()
});
