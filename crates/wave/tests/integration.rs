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
    collections::HashMap,
    sync::{
        Arc, Mutex, OnceLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use tidal_wave::{Plugin, StopReason, Wave, WaveConfig, WaveContext, WaveError};
use tokio::time::{sleep, timeout};

/// Records every hook call, per-item session counts, peak session
/// parallelism and any overlap between lifecycle hooks.
#[derive(Default)]
struct Recorder {
    hooks:        Mutex<Vec<String>>,
    items:        Mutex<HashMap<String, usize>>,
    sessions:     AtomicUsize,
    in_flight:    AtomicUsize,
    peak:         AtomicUsize,
    in_lifecycle: AtomicBool,
    overlaps:     AtomicUsize,
    session_time: Duration,
}

impl Recorder {
    fn with_session_time(session_time: Duration) -> Self {
        Recorder {
            session_time,
            ..Default::default()
        }
    }

    async fn lifecycle(&self, hook: &str, ctx: &WaveContext) {
        if self.in_lifecycle.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        self.hooks
            .lock()
            .unwrap()
            .push(format!("{hook}:{}", ctx.sweep()));
        sleep(Duration::from_millis(2)).await;
        self.in_lifecycle.store(false, Ordering::SeqCst);
    }

    fn count(&self, hook: &str) -> usize {
        let prefix = format!("{hook}:");
        self.hooks
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.starts_with(&prefix))
            .count()
    }

    fn sessions(&self) -> usize { self.sessions.load(Ordering::SeqCst) }
}

#[async_trait::async_trait]
impl Plugin for Recorder {
    fn name(&self) -> &'static str { "recorder" }

    async fn init(&self, ctx: &WaveContext) { self.lifecycle("init", ctx).await; }

    async fn start(&self, ctx: &WaveContext) { self.lifecycle("start", ctx).await; }

    async fn pause(&self, ctx: &WaveContext) { self.lifecycle("pause", ctx).await; }

    async fn unpause(&self, ctx: &WaveContext) { self.lifecycle("unpause", ctx).await; }

    async fn end(&self, ctx: &WaveContext) { self.lifecycle("end", ctx).await; }

    async fn session(&self, _ctx: &WaveContext, item: &str) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.session_time.is_zero() {
            sleep(self.session_time).await;
        }
        *self.items.lock().unwrap().entry(item.to_owned()).or_default() += 1;
        self.sessions.fetch_add(1, Ordering::SeqCst);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn hosts(n: usize) -> Vec<String> { (0..n).map(|i| format!("host-{i}")).collect() }

fn wave_with(config: WaveConfig, recorder: &Arc<Recorder>) -> Wave {
    tidal_common_telemetry::init_default_ut_logging();
    let wave = Wave::new(config);
    wave.add_plugin(recorder.clone());
    wave
}

async fn wait_for(mut done: impl FnMut() -> bool) {
    timeout(Duration::from_secs(10), async {
        while !done() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_sweep_processes_each_item_once() {
    let recorder = Arc::new(Recorder::with_session_time(Duration::from_millis(5)));
    let wave = wave_with(
        WaveConfig::builder()
            .items(hosts(10))
            .concurrency(2)
            .name("single")
            .build(),
        &recorder,
    );

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let stops = Arc::new(Mutex::new(Vec::new()));
    for counter in [first.clone(), second.clone()] {
        wave.after_each(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    }
    let sink = stops.clone();
    wave.on_stop(move |reason| sink.lock().unwrap().push(reason));

    let mut sweeps = wave.start().await.unwrap();
    let summary = sweeps.next().await.unwrap();
    assert!(sweeps.next().await.is_none());
    wave.wait().await;

    assert_eq!(summary.sweep, 1);
    assert_eq!(summary.items, 10);
    assert_eq!(summary.sessions, 10);
    assert_eq!(summary.panics, 0);
    assert_eq!(recorder.sessions(), 10);
    let items = recorder.items.lock().unwrap();
    assert_eq!(items.len(), 10);
    assert!(items.values().all(|&n| n == 1));
    drop(items);

    assert!(recorder.peak.load(Ordering::SeqCst) <= 2);
    assert_eq!(recorder.count("init"), 1);
    assert_eq!(recorder.count("start"), 1);
    assert_eq!(recorder.count("end"), 1);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(*stops.lock().unwrap(), vec![StopReason::Completed]);
    assert!(!wave.is_paused());
}

#[tokio::test]
async fn test_invalid_configuration_has_no_side_effects() {
    let recorder = Arc::new(Recorder::default());
    let wave = wave_with(
        WaveConfig::builder().items(hosts(3)).concurrency(0).build(),
        &recorder,
    );
    let err = wave.start().await.unwrap_err();
    assert!(matches!(err, WaveError::InvalidConfiguration { .. }));

    let unnamed = wave_with(
        WaveConfig::builder().items(hosts(3)).concurrency(1).name("").build(),
        &recorder,
    );
    let err = unnamed.start().await.unwrap_err();
    assert!(matches!(err, WaveError::InvalidConfiguration { .. }));

    sleep(Duration::from_millis(20)).await;
    assert!(recorder.hooks.lock().unwrap().is_empty());
    assert_eq!(recorder.sessions(), 0);
    assert!(matches!(wave.pause().await, Err(WaveError::NeverStarted { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_init_fires_once_across_repeats() {
    let recorder = Arc::new(Recorder::default());
    let wave = wave_with(
        WaveConfig::builder()
            .items(hosts(3))
            .concurrency(2)
            .repeat(true)
            .build(),
        &recorder,
    );

    let mut sweeps = wave.start().await.unwrap();
    for expected in 1..=3 {
        assert_eq!(sweeps.next().await.unwrap().sweep, expected);
    }
    wave.stop().await.unwrap();

    assert_eq!(recorder.count("init"), 1);
    assert!(recorder.count("start") >= 3);
    assert!(recorder.count("end") >= 3);
    let hooks = recorder.hooks.lock().unwrap();
    assert_eq!(hooks.first().map(String::as_str), Some("init:0"));
    assert_eq!(recorder.overlaps.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pause_holds_back_remaining_items() {
    let recorder = Arc::new(Recorder::with_session_time(Duration::from_millis(20)));
    let wave = wave_with(
        WaveConfig::builder().items(hosts(20)).concurrency(2).build(),
        &recorder,
    );

    wave.start().await.unwrap();
    wait_for(|| recorder.sessions() >= 2).await;
    wave.pause().await.unwrap();
    assert!(wave.is_paused());

    // In-flight sessions finish, then nothing new is claimed.
    sleep(Duration::from_millis(80)).await;
    let parked = recorder.sessions();
    sleep(Duration::from_millis(120)).await;
    assert_eq!(recorder.sessions(), parked);
    assert!(parked < 20);
    assert_eq!(recorder.in_flight.load(Ordering::SeqCst), 0);

    wave.resume().await.unwrap();
    assert!(!wave.is_paused());
    wave.wait().await;

    assert_eq!(recorder.sessions(), 20);
    assert!(recorder.items.lock().unwrap().values().all(|&n| n == 1));
    assert_eq!(recorder.count("pause"), 1);
    assert_eq!(recorder.count("unpause"), 1);
    assert_eq!(recorder.count("end"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_repeat_honours_wait_interval() {
    let recorder = Arc::new(Recorder::default());
    let wait = Duration::from_millis(100);
    let wave = wave_with(
        WaveConfig::builder()
            .items(hosts(2))
            .concurrency(2)
            .repeat(true)
            .wait_interval(wait)
            .build(),
        &recorder,
    );

    let mut sweeps = wave.start().await.unwrap();
    let mut completed_at = Vec::new();
    for _ in 0..3 {
        sweeps.next().await.unwrap();
        completed_at.push(Instant::now());
    }
    wave.stop().await.unwrap();

    for pair in completed_at.windows(2) {
        assert!(pair[1].duration_since(pair[0]) >= wait);
    }
    assert_eq!(recorder.count("init"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pause_during_wait_holds_the_next_cohort() {
    let recorder = Arc::new(Recorder::default());
    let wave = wave_with(
        WaveConfig::builder()
            .items(hosts(3))
            .concurrency(2)
            .repeat(true)
            .wait_interval(Duration::from_millis(150))
            .build(),
        &recorder,
    );

    let mut sweeps = wave.start().await.unwrap();
    assert_eq!(sweeps.next().await.unwrap().sessions, 3);
    wave.pause().await.unwrap();

    // The second sweep launches after the interval, but every worker starts
    // out idle.
    sleep(Duration::from_millis(400)).await;
    assert_eq!(recorder.count("start"), 2);
    assert_eq!(recorder.sessions(), 3);
    assert!(wave.is_paused());

    wave.resume().await.unwrap();
    let second = sweeps.next().await.unwrap();
    assert_eq!(second.sweep, 2);
    assert_eq!(second.sessions, 3);
    wave.stop().await.unwrap();

    assert!(recorder.items.lock().unwrap().values().all(|&n| n >= 2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_ends_a_continuous_wave() {
    let recorder = Arc::new(Recorder::default());
    let wave = wave_with(
        WaveConfig::builder()
            .items(hosts(10))
            .concurrency(10)
            .repeat(true)
            .build(),
        &recorder,
    );
    let stops = Arc::new(AtomicUsize::new(0));
    let counter = stops.clone();
    wave.on_stop(move |reason| {
        assert_eq!(reason, StopReason::Killed);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    wave.start().await.unwrap();
    wait_for(|| recorder.sessions() >= 100).await;
    wave.stop().await.unwrap();
    assert!(wave.is_stopped());

    let total = recorder.sessions();
    assert!(total >= 100);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.sessions(), total);
    assert_eq!(stops.load(Ordering::SeqCst), 1);

    // Stopping again is a no-op; late listeners still hear about the stop.
    wave.stop().await.unwrap();
    let late = Arc::new(Mutex::new(None));
    let slot = late.clone();
    wave.on_stop(move |reason| *slot.lock().unwrap() = Some(reason));
    assert_eq!(*late.lock().unwrap(), Some(StopReason::Killed));
    assert_eq!(stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_resume_is_idempotent() {
    let recorder = Arc::new(Recorder::default());
    let wave = wave_with(
        WaveConfig::builder()
            .items(hosts(4))
            .concurrency(2)
            .repeat(true)
            .wait_interval(Duration::from_millis(20))
            .build(),
        &recorder,
    );
    wave.start().await.unwrap();

    wave.resume().await.unwrap();
    assert_eq!(recorder.count("unpause"), 0);

    wave.pause().await.unwrap();
    assert!(matches!(wave.pause().await, Err(WaveError::AlreadyPaused { .. })));
    wave.resume().await.unwrap();
    wave.resume().await.unwrap();
    assert_eq!(recorder.count("pause"), 1);
    assert_eq!(recorder.count("unpause"), 1);
    assert!(!wave.is_paused());

    wave.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_start_while_paused_resumes() {
    let recorder = Arc::new(Recorder::with_session_time(Duration::from_millis(10)));
    let wave = wave_with(
        WaveConfig::builder().items(hosts(8)).concurrency(2).build(),
        &recorder,
    );
    let mut sweeps = wave.start().await.unwrap();
    wave.pause().await.unwrap();

    let mut again = wave.start().await.unwrap();
    assert!(!wave.is_paused());
    assert_eq!(recorder.count("unpause"), 1);
    assert_eq!(recorder.count("init"), 1);

    assert_eq!(sweeps.next().await.unwrap().sessions, 8);
    assert_eq!(again.next().await.unwrap().sessions, 8);
    wave.wait().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_finish_completes_the_running_sweep() {
    let recorder = Arc::new(Recorder::with_session_time(Duration::from_millis(10)));
    let wave = wave_with(
        WaveConfig::builder()
            .items(hosts(6))
            .concurrency(2)
            .repeat(true)
            .build(),
        &recorder,
    );
    let reason = Arc::new(Mutex::new(None));
    let slot = reason.clone();
    wave.on_stop(move |r| *slot.lock().unwrap() = Some(r));

    wave.start().await.unwrap();
    wait_for(|| recorder.sessions() >= 1).await;
    wave.finish().await.unwrap();

    let sweeps = recorder.count("end");
    assert!(sweeps >= 1);
    assert_eq!(recorder.sessions(), sweeps * 6);
    assert_eq!(*reason.lock().unwrap(), Some(StopReason::Finished));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_finish_starts_an_idle_wave() {
    let recorder = Arc::new(Recorder::default());
    let wave = wave_with(
        WaveConfig::builder()
            .items(hosts(5))
            .concurrency(3)
            .repeat(true)
            .build(),
        &recorder,
    );
    wave.finish().await.unwrap();
    assert_eq!(recorder.count("init"), 1);
    assert!(recorder.count("end") >= 1);
    assert_eq!(recorder.sessions() % 5, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_during_wait_prevents_next_sweep() {
    let recorder = Arc::new(Recorder::default());
    let wave = wave_with(
        WaveConfig::builder()
            .items(hosts(4))
            .concurrency(2)
            .repeat(true)
            .wait_interval(Duration::from_secs(30))
            .build(),
        &recorder,
    );

    let mut sweeps = wave.start().await.unwrap();
    sweeps.next().await.unwrap();
    timeout(Duration::from_secs(1), wave.stop())
        .await
        .expect("stop must interrupt the wait interval")
        .unwrap();

    assert!(sweeps.next().await.is_none());
    assert_eq!(recorder.sessions(), 4);
    assert_eq!(recorder.count("start"), 1);
    assert_eq!(recorder.count("end"), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_while_paused_drops_unclaimed_items() {
    let recorder = Arc::new(Recorder::with_session_time(Duration::from_millis(10)));
    let wave = wave_with(
        WaveConfig::builder().items(hosts(30)).concurrency(3).build(),
        &recorder,
    );
    let summaries = Arc::new(AtomicUsize::new(0));
    let counter = summaries.clone();
    wave.after_each(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    wave.start().await.unwrap();
    wait_for(|| recorder.sessions() >= 3).await;
    wave.pause().await.unwrap();
    wave.stop().await.unwrap();

    assert!(recorder.sessions() < 30);
    assert_eq!(recorder.count("end"), 0);
    assert_eq!(summaries.load(Ordering::SeqCst), 0);
    assert!(!wave.is_paused());
}

struct Exploding;

#[async_trait::async_trait]
impl Plugin for Exploding {
    async fn session(&self, _ctx: &WaveContext, item: &str) {
        assert!(item != "host-2", "cannot reach {item}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_session_does_not_lose_items() {
    let recorder = Arc::new(Recorder::default());
    let wave = Wave::new(
        WaveConfig::builder()
            .items(hosts(6))
            .concurrency(2)
            .build(),
    );
    wave.set_plugins(vec![Arc::new(Exploding) as Arc<dyn Plugin>, recorder.clone()]);

    let mut sweeps = wave.start().await.unwrap();
    let summary = sweeps.next().await.unwrap();
    wave.wait().await;

    assert_eq!(summary.sessions, 6);
    assert_eq!(summary.panics, 1);
    // The failing item's chain stops at the panic; every other item completes.
    assert_eq!(recorder.sessions(), 5);
    assert!(!recorder.items.lock().unwrap().contains_key("host-2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lifecycle_hooks_never_overlap() {
    let recorder = Arc::new(Recorder::with_session_time(Duration::from_millis(1)));
    let wave = wave_with(
        WaveConfig::builder()
            .items(hosts(12))
            .concurrency(4)
            .repeat(true)
            .build(),
        &recorder,
    );
    wave.start().await.unwrap();

    let toggler = {
        let wave = wave.clone();
        tokio::spawn(async move {
            for _ in 0..10 {
                let _ = wave.pause().await;
                sleep(Duration::from_millis(3)).await;
                let _ = wave.resume().await;
                sleep(Duration::from_millis(3)).await;
            }
        })
    };
    toggler.await.unwrap();
    wave.stop().await.unwrap();

    assert_eq!(recorder.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(recorder.count("pause"), 10);
    assert_eq!(recorder.count("unpause"), 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_start_on_running_wave_does_not_refire_start_hooks() {
    let recorder = Arc::new(Recorder::default());
    let wave = wave_with(
        WaveConfig::builder()
            .items(hosts(3))
            .concurrency(2)
            .repeat(true)
            .wait_interval(Duration::from_secs(30))
            .build(),
        &recorder,
    );

    let mut sweeps = wave.start().await.unwrap();
    sweeps.next().await.unwrap();
    let _again = wave.start().await.unwrap();
    let _third = wave.start().await.unwrap();

    assert_eq!(recorder.count("init"), 1);
    assert_eq!(recorder.count("start"), 1);
    assert_eq!(recorder.count("unpause"), 0);
    assert_eq!(recorder.sessions(), 3);
    wave.stop().await.unwrap();
}

/// Stops its own wave from inside `session` by spawning the call.
struct SelfStopping {
    wave:     OnceLock<Wave>,
    trigger:  &'static str,
    sessions: AtomicUsize,
}

#[async_trait::async_trait]
impl Plugin for SelfStopping {
    async fn session(&self, _ctx: &WaveContext, item: &str) {
        self.sessions.fetch_add(1, Ordering::SeqCst);
        if item == self.trigger {
            if let Some(wave) = self.wave.get() {
                let wave = wave.clone();
                tokio::spawn(async move { wave.stop().await });
            }
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_session_can_stop_its_wave_through_a_spawned_task() {
    tidal_common_telemetry::init_default_ut_logging();
    let plugin = Arc::new(SelfStopping {
        wave:     OnceLock::new(),
        trigger:  "host-1",
        sessions: AtomicUsize::new(0),
    });
    let wave = Wave::new(
        WaveConfig::builder()
            .items(hosts(4))
            .concurrency(1)
            .repeat(true)
            .build(),
    );
    wave.add_plugin(plugin.clone());
    assert!(plugin.wave.set(wave.clone()).is_ok());

    let reason = Arc::new(Mutex::new(None));
    let slot = reason.clone();
    wave.on_stop(move |r| *slot.lock().unwrap() = Some(r));

    wave.start().await.unwrap();
    timeout(Duration::from_secs(5), wave.wait())
        .await
        .expect("wave stopped by its own session");

    assert_eq!(*reason.lock().unwrap(), Some(StopReason::Killed));
    // The stop lands at an item boundary, well before a second sweep ends.
    assert!(plugin.sessions.load(Ordering::SeqCst) < 8);
}
