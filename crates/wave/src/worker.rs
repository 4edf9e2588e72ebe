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
    any::Any,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Instant,
};

use futures::FutureExt;
use tokio::sync::watch;
use tracing::{debug, error, trace};

use crate::{
    context::WaveContext,
    metrics::{WAVE_SESSION_DURATION_SECONDS, WAVE_SESSION_PANICS, WAVE_SESSIONS, WAVE_WORKERS_ACTIVE},
    plugin::Plugins,
    queue::WorkQueue,
};

/// Intent relayed to a worker. Dropping the sender means "terminate".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Control {
    Run,
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub(crate) enum WorkerState {
    Starting,
    Working,
    Idle,
    Terminated,
}

/// Per-sweep counters shared by a cohort.
#[derive(Debug, Default)]
pub(crate) struct Tally {
    pub(crate) sessions: AtomicUsize,
    pub(crate) panics:   AtomicUsize,
}

/// One member of a sweep's cohort.
pub(crate) struct Worker {
    id:      usize,
    ctx:     WaveContext,
    plugins: Plugins,
    queue:   WorkQueue,
    control: watch::Receiver<Control>,
    tally:   Arc<Tally>,
}

impl Worker {
    pub(crate) fn new(
        id: usize,
        ctx: WaveContext,
        plugins: Plugins,
        queue: WorkQueue,
        control: watch::Receiver<Control>,
        tally: Arc<Tally>,
    ) -> Self {
        Worker {
            id,
            ctx,
            plugins,
            queue,
            control,
            tally,
        }
    }

    /// Drive the state machine until it terminates.
    pub(crate) async fn run(mut self) {
        debug!(wave = self.ctx.name(), worker = self.id, "Worker launched");
        WAVE_WORKERS_ACTIVE.with_label_values(&[self.ctx.name()]).inc();

        let mut state = WorkerState::Starting;
        while state != WorkerState::Terminated {
            let next = match state {
                WorkerState::Starting => self.starting(),
                WorkerState::Working => self.working().await,
                WorkerState::Idle => self.idle().await,
                WorkerState::Terminated => unreachable!("loop exits on termination"),
            };
            if next != state {
                trace!(wave = self.ctx.name(), worker = self.id, from = %state, to = %next, "Worker state change");
            }
            state = next;
        }

        WAVE_WORKERS_ACTIVE.with_label_values(&[self.ctx.name()]).dec();
    }

    /// Honor whatever was requested before this worker got scheduled.
    fn starting(&mut self) -> WorkerState {
        match *self.control.borrow_and_update() {
            Control::Run => WorkerState::Working,
            Control::Pause => WorkerState::Idle,
        }
    }

    async fn working(&mut self) -> WorkerState {
        tokio::select! {
            biased;
            changed = self.control.changed() => self.on_control(changed.is_ok()),
            item = self.queue.next() => match item {
                Some(item) => {
                    self.session(&item).await;
                    WorkerState::Working
                }
                None => {
                    debug!(wave = self.ctx.name(), worker = self.id, "Worker quitting; queue exhausted");
                    WorkerState::Terminated
                }
            },
        }
    }

    async fn idle(&mut self) -> WorkerState {
        let changed = self.control.changed().await;
        self.on_control(changed.is_ok())
    }

    fn on_control(&mut self, open: bool) -> WorkerState {
        if !open {
            debug!(wave = self.ctx.name(), worker = self.id, "Worker quitting; control channel closed");
            return WorkerState::Terminated;
        }
        match *self.control.borrow_and_update() {
            Control::Run => WorkerState::Working,
            Control::Pause => WorkerState::Idle,
        }
    }

    /// Run the full session chain for one claimed item. Never interrupted;
    /// a panic is contained to this item.
    async fn session(&self, item: &str) {
        trace!(wave = self.ctx.name(), worker = self.id, item, "Worker processing");
        let start = Instant::now();
        let chain = async {
            for plugin in self.plugins.iter() {
                plugin.session(&self.ctx, item).await;
            }
        };

        if let Err(panic) = AssertUnwindSafe(chain).catch_unwind().await {
            error!(
                wave = self.ctx.name(),
                worker = self.id,
                item,
                panic = panic_message(panic.as_ref()),
                "Session panicked"
            );
            self.tally.panics.fetch_add(1, Ordering::Relaxed);
            WAVE_SESSION_PANICS.with_label_values(&[self.ctx.name()]).inc();
        }

        self.tally.sessions.fetch_add(1, Ordering::Relaxed);
        WAVE_SESSIONS.with_label_values(&[self.ctx.name()]).inc();
        WAVE_SESSION_DURATION_SECONDS
            .with_label_values(&[self.ctx.name()])
            .observe(start.elapsed().as_secs_f64());
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
