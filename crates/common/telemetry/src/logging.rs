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
    env,
    io::IsTerminal,
    sync::{Mutex, Once},
};

use bon::Builder;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    filter::{LevelFilter, ParseError, Targets},
    fmt::MakeWriter,
    layer::{Layered, SubscriberExt},
    reload,
};

/// Deserializes a string value, using `Default::default()` if the string is
/// empty.
///
/// # Errors
/// Returns an error if deserialization fails.
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        return Ok(T::default());
    }
    T::deserialize(de::value::StrDeserializer::<de::value::Error>::new(&s))
        .map_err(|e| de::Error::custom(format!("invalid value {s:?}: {e}")))
}

/// Configuration options for the logging system.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for hourly rotated log files. Empty disables file logging.
    #[default = ""]
    #[builder(default, into)]
    pub dir: String,

    /// Level filter such as `"info"` or `"info,tidal_wave=debug"`. Falls
    /// back to `RUST_LOG`, then to `"info"`.
    #[builder(into)]
    pub level: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Maximum number of rotated log files to retain.
    #[default = 720]
    #[builder(default = 720)]
    pub max_log_files: usize,

    /// Whether to write to stdout in addition to files.
    #[default = true]
    #[builder(default = true)]
    pub append_stdout: bool,
}

/// Available log output formats.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per event, with the current span and span list.
    #[display("json")]
    Json,

    /// Human-readable text.
    #[default]
    #[display("text")]
    Text,
}

/// Subscriber the output layers are stacked on: the registry behind the
/// reloadable level filter.
type Base = Layered<reload::Layer<Targets, Registry>, Registry>;

type BoxedLayer = Box<dyn Layer<Base> + Send + Sync>;

static RELOAD_HANDLE: OnceCell<reload::Handle<Targets, Registry>> = OnceCell::new();

const DEFAULT_LOG_TARGETS: &str = "info";

/// Initialize logging for unit and integration tests.
///
/// Writes to `UNITTEST_LOG_DIR` (default `/tmp/__unittest_logs`) at
/// `UNITTEST_LOG_LEVEL` (default `debug`). Safe to call from every test.
pub fn init_default_ut_logging() {
    static GUARDS: OnceCell<Mutex<Vec<WorkerGuard>>> = OnceCell::new();

    GUARDS.get_or_init(|| {
        let dir =
            env::var("UNITTEST_LOG_DIR").unwrap_or_else(|_| "/tmp/__unittest_logs".to_string());
        let level = env::var("UNITTEST_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());
        let opts = LoggingOptions::builder()
            .dir(dir.as_str())
            .level(level)
            .append_stdout(false)
            .build();
        let guards = init_global_logging("unittest", &opts);
        tracing::info!(dir = %dir, "Unit test logging initialized");
        Mutex::new(guards)
    });
}

/// Install the global tracing subscriber.
///
/// Layers: stdout (if `append_stdout`), a rotated main log file and an
/// error-only log file (if `dir` is set), all behind one level filter that
/// [`reload_level`] can replace later. Only the first call has an effect;
/// keep the returned guards alive for as long as logs should be flushed.
///
/// # Panics
/// Panics if the log directory cannot be created, the level string is
/// invalid, or another global subscriber was installed first.
pub fn init_global_logging(app_name: &str, opts: &LoggingOptions) -> Vec<WorkerGuard> {
    static START: Once = Once::new();
    let mut guards = Vec::new();

    START.call_once(|| {
        LogTracer::init().expect("log tracer must be valid");

        let mut layers: Vec<BoxedLayer> = Vec::new();
        if opts.append_stdout {
            let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
            guards.push(guard);
            layers.push(fmt_layer(writer, opts.log_format, std::io::stdout().is_terminal()));
        }
        if !opts.dir.is_empty() {
            let (main, guard) = file_writer(app_name, opts);
            guards.push(guard);
            layers.push(fmt_layer(main, opts.log_format, false));

            let (errors, guard) = file_writer(&format!("{app_name}-err"), opts);
            guards.push(guard);
            layers.push(
                fmt_layer(errors, opts.log_format, false)
                    .with_filter(LevelFilter::ERROR)
                    .boxed(),
            );
        }

        let env_level = env::var(EnvFilter::DEFAULT_ENV).ok();
        let targets: Targets = opts
            .level
            .as_deref()
            .or(env_level.as_deref())
            .unwrap_or(DEFAULT_LOG_TARGETS)
            .parse()
            .expect("error parsing log level string");
        let (filter, handle) = reload::Layer::new(targets);
        let _ = RELOAD_HANDLE.set(handle);

        let subscriber = Registry::default().with(filter).with(layers);
        tracing::subscriber::set_global_default(subscriber)
            .expect("error setting global tracing subscriber");
    });

    guards
}

/// Replace the level filter at runtime, e.g. `"debug"` or
/// `"info,tidal_wave=trace"`.
///
/// Returns `Ok(false)` when [`init_global_logging`] has not installed a
/// subscriber yet.
///
/// # Errors
/// Returns an error if `level` is not a valid filter string.
pub fn reload_level(level: &str) -> Result<bool, ParseError> {
    let targets: Targets = level.parse()?;
    Ok(RELOAD_HANDLE
        .get()
        .is_some_and(|handle| handle.reload(targets).is_ok()))
}

fn fmt_layer<W>(writer: W, format: LogFormat, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi);
    match format {
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Text => layer.boxed(),
    }
}

fn file_writer(prefix: &str, opts: &LoggingOptions) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::HOURLY)
        .filename_prefix(prefix)
        .max_log_files(opts.max_log_files)
        .build(&opts.dir)
        .unwrap_or_else(|e| panic!("initializing log files in {} failed: {e}", opts.dir));
    tracing_appender::non_blocking(appender)
}
