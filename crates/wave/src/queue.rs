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

use tokio::{
    runtime::Handle,
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::WaveConfig;

/// Consumer side of one sweep's work queue.
///
/// Every clone pulls from the same bounded channel, so each item reaches
/// exactly one worker. Once the feeder is done and the buffer is drained,
/// [`next`](WorkQueue::next) returns `None` immediately for every caller.
#[derive(Clone)]
pub(crate) struct WorkQueue {
    rx: Arc<Mutex<mpsc::Receiver<String>>>,
}

impl WorkQueue {
    /// Spawn a feeder that pushes the configured items in order, and return
    /// the queue together with the feeder's handle (which yields the number
    /// of items it handed over).
    ///
    /// The feeder stops early when `cancel` fires or when every consumer has
    /// been dropped, so it never outlives an abandoned sweep.
    pub(crate) fn feed(
        wave: Arc<str>,
        config: Arc<WaveConfig>,
        cancel: CancellationToken,
        handle: &Handle,
    ) -> (Self, JoinHandle<usize>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity().max(1));

        let feeder = handle.spawn(async move {
            let mut fed = 0;
            for item in config.items() {
                trace!(wave = %wave, item = %item, "Sending");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        debug!(wave = %wave, fed, "Feeder cancelled");
                        break;
                    }
                    sent = tx.send(item.clone()) => {
                        if sent.is_err() {
                            debug!(wave = %wave, fed, "Feeder quitting; no consumers left");
                            break;
                        }
                    }
                }
                fed += 1;
            }
            fed
        });

        (
            WorkQueue {
                rx: Arc::new(Mutex::new(rx)),
            },
            feeder,
        )
    }

    /// Claim the next item, or `None` once the queue is exhausted.
    ///
    /// Cancel safe: dropping the future never loses an item.
    pub(crate) async fn next(&self) -> Option<String> { self.rx.lock().await.recv().await }
}
