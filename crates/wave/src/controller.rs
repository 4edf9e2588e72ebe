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
    sync::{Arc, atomic::Ordering},
    time::Instant,
};

use tokio::{runtime::Handle, sync::watch, task::JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    config::WaveConfig,
    fanout::SweepSummary,
    metrics::{WAVE_SWEEPS_ABORTED, WAVE_SWEEPS_COMPLETED, WAVE_SWEEPS_STARTED},
    plugin::{Hook, Plugins, fire},
    queue::WorkQueue,
    wave::Shared,
    worker::{Tally, Worker},
};

pub(crate) enum SweepOutcome {
    Completed(SweepSummary),
    Aborted,
}

/// Runs exactly one sweep: launches the cohort and the feeder, relays
/// control changes to every worker, and fires the sweep-boundary hooks.
pub(crate) struct Controller {
    shared:  Arc<Shared>,
    sweep:   u64,
    config:  Arc<WaveConfig>,
    plugins: Plugins,
    handle:  Handle,
}

impl Controller {
    pub(crate) fn new(
        shared: Arc<Shared>,
        sweep: u64,
        config: Arc<WaveConfig>,
        plugins: Plugins,
        handle: Handle,
    ) -> Self {
        Controller {
            shared,
            sweep,
            config,
            plugins,
            handle,
        }
    }

    /// Run the sweep until every worker terminated or `kill` fired.
    ///
    /// On kill, in-flight sessions finish, unclaimed items are dropped and no
    /// `end` hooks fire.
    pub(crate) async fn run(self, kill: &CancellationToken) -> SweepOutcome {
        let started = Instant::now();
        let ctx = self.shared.context(self.sweep, self.config.clone());
        let name: Arc<str> = Arc::from(ctx.name());
        let sweep = self.sweep;
        info!(wave = %name, sweep, items = self.config.items().len(), "Launching");
        WAVE_SWEEPS_STARTED.with_label_values(&[&*name]).inc();

        // A pause requested before this sweep began is applied to every
        // worker before it runs.
        let mut control = self.shared.subscribe_control();
        let initial = *control.borrow_and_update();

        let feeder_cancel = kill.child_token();
        let (queue, feeder) = WorkQueue::feed(
            name.clone(),
            self.config.clone(),
            feeder_cancel.clone(),
            &self.handle,
        );

        let tally = Arc::new(Tally::default());
        let concurrency = self.config.concurrency();
        let mut relays = Vec::with_capacity(concurrency);
        let mut cohort = JoinSet::new();
        for id in 0..concurrency {
            let (tx, rx) = watch::channel(initial);
            relays.push(tx);
            let worker = Worker::new(
                id,
                ctx.clone(),
                self.plugins.clone(),
                queue.clone(),
                rx,
                tally.clone(),
            );
            cohort.spawn_on(worker.run(), &self.handle);
        }
        drop(queue);

        {
            let _lifecycle = self.shared.lifecycle().lock().await;
            fire(&self.plugins, Hook::Start, &ctx).await;
        }

        let killed = loop {
            tokio::select! {
                joined = cohort.join_next() => match joined {
                    None => break false,
                    Some(Ok(())) => {}
                    Some(Err(e)) => error!(wave = %name, sweep, error = ?e, "Worker task failed"),
                },
                changed = control.changed() => {
                    if changed.is_err() {
                        break true;
                    }
                    let value = *control.borrow_and_update();
                    debug!(wave = %name, sweep, control = ?value, "Relaying control to cohort");
                    for relay in &relays {
                        relay.send_replace(value);
                    }
                }
                () = kill.cancelled() => break true,
            }
        };

        if killed {
            info!(wave = %name, sweep, "Stop requested; waiting for in-flight sessions");
            // Closing every control channel moves each worker to Terminated
            // at its next item boundary.
            relays.clear();
            feeder_cancel.cancel();
            while let Some(joined) = cohort.join_next().await {
                if let Err(e) = joined {
                    error!(wave = %name, sweep, error = ?e, "Worker task failed");
                }
            }
            if let Err(e) = feeder.await {
                error!(wave = %name, sweep, error = ?e, "Feeder task failed");
            }
            WAVE_SWEEPS_ABORTED.with_label_values(&[&*name]).inc();
            info!(
                wave = %name,
                sweep,
                sessions = tally.sessions.load(Ordering::Relaxed),
                "Sweep abandoned"
            );
            return SweepOutcome::Aborted;
        }

        match feeder.await {
            Ok(fed) => debug!(wave = %name, sweep, fed, "Feeder finished"),
            Err(e) => error!(wave = %name, sweep, error = ?e, "Feeder task failed"),
        }

        {
            let _lifecycle = self.shared.lifecycle().lock().await;
            fire(&self.plugins, Hook::End, &ctx).await;
        }

        let summary = SweepSummary {
            sweep,
            items: self.config.items().len(),
            sessions: tally.sessions.load(Ordering::Relaxed),
            panics: tally.panics.load(Ordering::Relaxed),
            elapsed: started.elapsed(),
        };
        WAVE_SWEEPS_COMPLETED.with_label_values(&[&*name]).inc();
        info!(
            wave = %name,
            sweep,
            sessions = summary.sessions,
            panics = summary.panics,
            elapsed = ?summary.elapsed,
            "Sweep completed"
        );
        SweepOutcome::Completed(summary)
    }
}
