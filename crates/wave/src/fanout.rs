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

//! Completion notifications.
//!
//! Two kinds of listeners can be registered on a wave:
//! - **one-shot** listeners fire once, when the wave stops for good;
//! - **per-wave** listeners fire after every completed sweep and are released
//!   when the wave stops.
//!
//! Registration takes the write lock; delivery copies the listener list under
//! the read lock and calls the listeners after releasing it, so registering
//! never waits on a slow listener. A listener registered before an event is
//! always notified of it. A one-shot listener registered after the wave
//! stopped is called immediately.

use std::{
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{Arc, PoisonError, RwLock},
    task::{Context, Poll},
    time::Duration,
};

use futures::Stream;
use tokio::sync::mpsc;
use tracing::error;

/// Outcome of one completed sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    /// One-based sweep number.
    pub sweep:    u64,
    /// Number of configured items.
    pub items:    usize,
    /// Items whose session chain ran (including ones that panicked).
    pub sessions: usize,
    /// Items whose session chain panicked.
    pub panics:   usize,
    pub elapsed:  Duration,
}

/// Why a wave stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum StopReason {
    /// A non-repeating wave finished its only sweep.
    #[display("completed")]
    Completed,
    /// `finish` was requested and the running sweep completed.
    #[display("finished")]
    Finished,
    /// `stop` abandoned the wave.
    #[display("killed")]
    Killed,
}

/// Event delivered to completion listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Swept(SweepSummary),
    Stopped(StopReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    OneShot,
    PerWave,
}

type Notify = Arc<dyn Fn(&Completion) + Send + Sync>;

struct Registration {
    kind:   Kind,
    notify: Notify,
}

#[derive(Default)]
struct Registry {
    registrations: Vec<Registration>,
    stopped:       Option<StopReason>,
}

#[derive(Default)]
pub(crate) struct Fanout {
    registry: RwLock<Registry>,
}

impl Fanout {
    pub(crate) fn register(&self, kind: Kind, notify: Notify) {
        let late = {
            let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            match registry.stopped {
                Some(reason) => (kind == Kind::OneShot).then_some(reason),
                None => {
                    registry.registrations.push(Registration { kind, notify: notify.clone() });
                    None
                }
            }
        };
        if let Some(reason) = late {
            deliver(&[notify], &Completion::Stopped(reason));
        }
    }

    /// Register a per-wave listener feeding a [`Sweeps`] receiver.
    pub(crate) fn subscribe(&self) -> Sweeps {
        let (tx, rx) = mpsc::unbounded_channel();
        self.register(
            Kind::PerWave,
            Arc::new(move |completion: &Completion| {
                if let Completion::Swept(summary) = completion {
                    let _ = tx.send(summary.clone());
                }
            }),
        );
        Sweeps { rx }
    }

    pub(crate) fn sweep_completed(&self, summary: SweepSummary) {
        let listeners: Vec<Notify> = {
            let registry = self.registry.read().unwrap_or_else(PoisonError::into_inner);
            registry
                .registrations
                .iter()
                .filter(|r| r.kind == Kind::PerWave)
                .map(|r| r.notify.clone())
                .collect()
        };
        deliver(&listeners, &Completion::Swept(summary));
    }

    /// Notify one-shot listeners and release every registration. Only the
    /// first call has an effect.
    pub(crate) fn stopped(&self, reason: StopReason) {
        let registrations = {
            let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
            if registry.stopped.is_some() {
                return;
            }
            registry.stopped = Some(reason);
            std::mem::take(&mut registry.registrations)
        };
        let listeners: Vec<Notify> = registrations
            .into_iter()
            .filter(|r| r.kind == Kind::OneShot)
            .map(|r| r.notify)
            .collect();
        deliver(&listeners, &Completion::Stopped(reason));
    }
}

fn deliver(listeners: &[Notify], completion: &Completion) {
    for notify in listeners {
        if std::panic::catch_unwind(AssertUnwindSafe(|| notify(completion))).is_err() {
            error!(?completion, "Completion listener panicked");
        }
    }
}

/// Stream of sweep summaries returned by [`Wave::start`](crate::Wave::start).
///
/// Yields one summary per completed sweep, in order, and ends once the wave
/// has stopped. Aborted sweeps are not reported.
#[derive(Debug)]
pub struct Sweeps {
    rx: mpsc::UnboundedReceiver<SweepSummary>,
}

impl Sweeps {
    /// Wait for the next completed sweep; `None` once the wave stopped.
    pub async fn next(&mut self) -> Option<SweepSummary> { self.rx.recv().await }
}

impl Stream for Sweeps {
    type Item = SweepSummary;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
