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
    future::Future,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use tokio::{
    runtime::Handle,
    sync::{Mutex, watch},
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{
    config::WaveConfig,
    context::WaveContext,
    controller::{Controller, SweepOutcome},
    err::{AlreadyPausedSnafu, NeverStartedSnafu, Result, StoppedSnafu},
    fanout::{Completion, Fanout, Kind, StopReason, SweepSummary, Sweeps},
    id::WaveId,
    metrics::{WAVE_PAUSED, WAVE_RESUMED},
    plugin::{FnPlugin, Hook, Plugin, Plugins, fire},
    worker::Control,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    Idle,
    Running,
    Paused,
    Stopped,
}

/// State shared by every clone of a [`Wave`] and its supervisor task.
pub(crate) struct Shared {
    id:        WaveId,
    config:    RwLock<WaveConfig>,
    started:   AtomicBool,
    plugins:   RwLock<Vec<Arc<dyn Plugin>>>,
    /// Lifecycle state. Holding the lock also serializes lifecycle hooks.
    lifecycle: Mutex<State>,
    paused:    Arc<AtomicBool>,
    control:   watch::Sender<Control>,
    sweep:     AtomicU64,
    fanout:    Fanout,
    kill:      CancellationToken,
    finish:    CancellationToken,
    stopped:   CancellationToken,
}

impl Shared {
    pub(crate) const fn lifecycle(&self) -> &Mutex<State> { &self.lifecycle }

    pub(crate) fn subscribe_control(&self) -> watch::Receiver<Control> { self.control.subscribe() }

    pub(crate) fn context(&self, sweep: u64, config: Arc<WaveConfig>) -> WaveContext {
        let name: Arc<str> = Arc::from(config.name().unwrap_or_default());
        WaveContext::new(self.id, name, sweep, config, self.paused.clone())
    }

    fn config(&self) -> WaveConfig { self.config.read().unwrap_or_else(PoisonError::into_inner).clone() }

    fn name(&self) -> String {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .name()
            .unwrap_or_default()
            .to_owned()
    }

    fn plugins(&self) -> Plugins {
        self.plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Context for hooks fired outside a sweep boundary.
    fn current_context(&self) -> WaveContext {
        self.context(self.sweep.load(Ordering::Acquire), Arc::new(self.config()))
    }

    /// Validate the configuration and mark the wave as started. Edits made
    /// through [`Wave::configure`] from here on are validated eagerly.
    fn commit_start(&self) -> Result<Arc<WaveConfig>> {
        let config = self.config.read().unwrap_or_else(PoisonError::into_inner);
        config.validate()?;
        self.started.store(true, Ordering::Release);
        Ok(Arc::new(config.clone()))
    }

    async fn resume_locked(&self, state: &mut State) {
        self.paused.store(false, Ordering::Release);
        self.control.send_replace(Control::Run);
        *state = State::Running;
        let ctx = self.current_context();
        info!(wave = ctx.name(), sweep = ctx.sweep(), "Resuming wave");
        WAVE_RESUMED.with_label_values(&[ctx.name()]).inc();
        fire(&self.plugins(), Hook::Unpause, &ctx).await;
    }

    async fn mark_stopped(&self, reason: StopReason) {
        {
            let mut state = self.lifecycle.lock().await;
            *state = State::Stopped;
            self.paused.store(false, Ordering::Release);
        }
        info!(wave = %self.name(), %reason, "Wave stopped");
        self.fanout.stopped(reason);
        self.stopped.cancel();
    }
}

/// Handle to a wave: a bounded pool of workers sweeping a list of items,
/// optionally forever.
///
/// Cloning is cheap; every clone controls the same wave. The wave keeps
/// running when all handles are dropped, so stop continuous waves
/// explicitly.
///
/// # Example
///
/// ```rust
/// use std::sync::{
///     Arc,
///     atomic::{AtomicUsize, Ordering},
/// };
///
/// use tidal_wave::Wave;
///
/// # #[tokio::main]
/// # async fn main() -> tidal_wave::Result<()> {
/// let seen = Arc::new(AtomicUsize::new(0));
/// let counter = seen.clone();
/// let wave = Wave::once(2, ["db-1", "db-2", "db-3"], move |_host| {
///     let counter = counter.clone();
///     async move {
///         counter.fetch_add(1, Ordering::SeqCst);
///     }
/// });
///
/// let mut sweeps = wave.start().await?;
/// let summary = sweeps.next().await.expect("one sweep");
/// assert_eq!(summary.sessions, 3);
/// wave.wait().await;
/// assert_eq!(seen.load(Ordering::SeqCst), 3);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Wave {
    shared: Arc<Shared>,
}

impl Wave {
    /// Create a wave from `config`. Nothing runs until [`Wave::start`].
    pub fn new(mut config: WaveConfig) -> Self {
        let id = WaveId::new();
        config.name_or_default(|| id.default_name());
        let (control, _) = watch::channel(Control::Run);
        Wave {
            shared: Arc::new(Shared {
                id,
                config: RwLock::new(config),
                started: AtomicBool::new(false),
                plugins: RwLock::new(Vec::new()),
                lifecycle: Mutex::new(State::Idle),
                paused: Arc::new(AtomicBool::new(false)),
                control,
                sweep: AtomicU64::new(0),
                fanout: Fanout::default(),
                kill: CancellationToken::new(),
                finish: CancellationToken::new(),
                stopped: CancellationToken::new(),
            }),
        }
    }

    /// A wave that sweeps `items` once, calling `callback` per item.
    pub fn once<I, S, F, Fut>(concurrency: usize, items: I, callback: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::with_callback(concurrency, items, false, callback)
    }

    /// A wave that sweeps `items` over and over until stopped.
    pub fn continuous<I, S, F, Fut>(concurrency: usize, items: I, callback: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::with_callback(concurrency, items, true, callback)
    }

    fn with_callback<I, S, F, Fut>(concurrency: usize, items: I, repeat: bool, callback: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let config = WaveConfig::builder()
            .items(items.into_iter().map(Into::into).collect::<Vec<_>>())
            .concurrency(concurrency)
            .repeat(repeat)
            .build();
        let wave = Self::new(config);
        wave.add_plugin(Arc::new(FnPlugin::new(callback)));
        wave
    }

    pub fn id(&self) -> WaveId { self.shared.id }

    pub fn name(&self) -> String { self.shared.name() }

    /// Copy of the current configuration.
    pub fn config(&self) -> WaveConfig { self.shared.config() }

    /// Edit the configuration.
    ///
    /// Before the first [`start`](Wave::start) edits are applied as-is and
    /// validated by `start`. Afterwards the edited copy must be valid to be
    /// committed, and it applies from the next sweep on.
    pub fn configure(&self, f: impl FnOnce(&mut WaveConfig)) -> Result<()> {
        let mut config = self.shared.config.write().unwrap_or_else(PoisonError::into_inner);
        if !self.shared.started.load(Ordering::Acquire) {
            f(&mut config);
            return Ok(());
        }
        let mut edited = config.clone();
        f(&mut edited);
        edited.validate()?;
        *config = edited;
        Ok(())
    }

    /// Replace the plugin list. A running sweep keeps the list it began with.
    pub fn set_plugins(&self, plugins: Vec<Arc<dyn Plugin>>) {
        *self.shared.plugins.write().unwrap_or_else(PoisonError::into_inner) = plugins;
    }

    pub fn add_plugin(&self, plugin: Arc<dyn Plugin>) {
        self.shared
            .plugins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(plugin);
    }

    pub fn plugins(&self) -> Vec<Arc<dyn Plugin>> {
        self.shared
            .plugins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start the wave, or resume it when paused.
    ///
    /// The first call validates the configuration, runs the `init` hooks and
    /// launches the first sweep in the background. On a paused wave it
    /// resumes and fires the `unpause` hooks. On a running wave it only
    /// returns another receiver and does not fire the `start` hooks again,
    /// so they fire exactly once per sweep. Every call returns a [`Sweeps`]
    /// receiver reporting each completed sweep from then on.
    pub async fn start(&self) -> Result<Sweeps> {
        let mut state = self.shared.lifecycle.lock().await;
        match *state {
            State::Stopped => return StoppedSnafu { name: self.name() }.fail(),
            State::Running => {}
            State::Paused => self.shared.resume_locked(&mut state).await,
            State::Idle => {
                let config = self.shared.commit_start()?;
                let sweeps = self.shared.fanout.subscribe();
                let ctx = self.shared.context(0, config.clone());
                info!(
                    wave = ctx.name(),
                    id = %ctx.id(),
                    items = ctx.items().len(),
                    concurrency = ctx.concurrency(),
                    repeat = ctx.repeat(),
                    "Starting wave"
                );
                fire(&self.shared.plugins(), Hook::Init, &ctx).await;
                *state = State::Running;

                let handle = config.spawn_handle();
                handle.spawn(supervise(self.shared.clone(), handle.clone()));
                return Ok(sweeps);
            }
        }
        Ok(self.shared.fanout.subscribe())
    }

    /// Pause the wave. Workers finish the session they are in and park.
    pub async fn pause(&self) -> Result<()> {
        let mut state = self.shared.lifecycle.lock().await;
        match *state {
            State::Idle => NeverStartedSnafu { name: self.name() }.fail(),
            State::Paused => AlreadyPausedSnafu { name: self.name() }.fail(),
            State::Stopped => StoppedSnafu { name: self.name() }.fail(),
            State::Running => {
                self.shared.paused.store(true, Ordering::Release);
                self.shared.control.send_replace(Control::Pause);
                *state = State::Paused;
                let ctx = self.shared.current_context();
                info!(wave = ctx.name(), sweep = ctx.sweep(), "Pausing wave");
                WAVE_PAUSED.with_label_values(&[ctx.name()]).inc();
                fire(&self.shared.plugins(), Hook::Pause, &ctx).await;
                Ok(())
            }
        }
    }

    /// Resume a paused wave. A no-op when the wave is running.
    pub async fn resume(&self) -> Result<()> {
        let mut state = self.shared.lifecycle.lock().await;
        match *state {
            State::Idle => NeverStartedSnafu { name: self.name() }.fail(),
            State::Stopped => StoppedSnafu { name: self.name() }.fail(),
            State::Running => Ok(()),
            State::Paused => {
                self.shared.resume_locked(&mut state).await;
                Ok(())
            }
        }
    }

    /// Stop the wave for good and wait until it has stopped.
    ///
    /// Sessions already running complete; items not yet claimed are dropped.
    /// The interrupted sweep fires no `end` hooks and is not reported as
    /// completed. Stopping a stopped wave is a no-op.
    pub async fn stop(&self) -> Result<()> {
        {
            let state = self.shared.lifecycle.lock().await;
            match *state {
                State::Idle => return NeverStartedSnafu { name: self.name() }.fail(),
                State::Stopped => return Ok(()),
                State::Running | State::Paused => self.shared.kill.cancel(),
            }
        }
        self.wait().await;
        Ok(())
    }

    /// Let the current sweep run to completion, then stop instead of
    /// repeating. Starts or resumes the wave if needed, and waits until it
    /// has stopped.
    pub async fn finish(&self) -> Result<()> {
        let idle = *self.shared.lifecycle.lock().await == State::Idle;
        if idle {
            self.start().await?;
        }
        {
            let mut state = self.shared.lifecycle.lock().await;
            if *state == State::Paused {
                self.shared.resume_locked(&mut state).await;
            }
            self.shared.finish.cancel();
        }
        self.wait().await;
        Ok(())
    }

    /// Wait until the wave has stopped.
    pub async fn wait(&self) { self.shared.stopped.cancelled().await }

    /// Best-effort snapshot; may be stale by the time it is read.
    pub fn is_paused(&self) -> bool { self.shared.paused.load(Ordering::Acquire) }

    pub fn is_stopped(&self) -> bool { self.shared.stopped.is_cancelled() }

    /// Call `f` once when the wave stops. Registering on a stopped wave
    /// calls `f` right away.
    pub fn on_stop(&self, f: impl Fn(StopReason) + Send + Sync + 'static) {
        self.shared.fanout.register(
            Kind::OneShot,
            Arc::new(move |completion: &Completion| {
                if let Completion::Stopped(reason) = completion {
                    f(*reason);
                }
            }),
        );
    }

    /// Call `f` after every completed sweep until the wave stops.
    pub fn after_each(&self, f: impl Fn(&SweepSummary) + Send + Sync + 'static) {
        self.shared.fanout.register(
            Kind::PerWave,
            Arc::new(move |completion: &Completion| {
                if let Completion::Swept(summary) = completion {
                    f(summary);
                }
            }),
        );
    }

    /// Receiver for completed sweeps without starting the wave.
    pub fn sweeps(&self) -> Sweeps { self.shared.fanout.subscribe() }
}

impl std::fmt::Debug for Wave {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wave")
            .field("id", &self.shared.id)
            .field("name", &self.name())
            .field("paused", &self.is_paused())
            .field("stopped", &self.is_stopped())
            .finish_non_exhaustive()
    }
}

/// Drive sweeps until the wave is stopped, finished, or stops repeating.
async fn supervise(shared: Arc<Shared>, handle: Handle) {
    let mut sweep = 0;
    let reason = loop {
        if shared.kill.is_cancelled() {
            break StopReason::Killed;
        }
        sweep += 1;
        shared.sweep.store(sweep, Ordering::Release);

        let config = Arc::new(shared.config());
        let controller = Controller::new(
            shared.clone(),
            sweep,
            config,
            shared.plugins(),
            handle.clone(),
        );
        match controller.run(&shared.kill).await {
            SweepOutcome::Aborted => break StopReason::Killed,
            SweepOutcome::Completed(summary) => shared.fanout.sweep_completed(summary),
        }

        if shared.finish.is_cancelled() {
            break StopReason::Finished;
        }
        let live = shared.config();
        if !live.repeat() {
            break StopReason::Completed;
        }

        tokio::select! {
            biased;
            () = shared.kill.cancelled() => break StopReason::Killed,
            () = shared.finish.cancelled() => break StopReason::Finished,
            () = tokio::time::sleep(live.wait_interval()) => {}
        }
    };
    shared.mark_stopped(reason).await;
}
