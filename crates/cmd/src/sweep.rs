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

use std::{path::PathBuf, sync::Arc};

use clap::{Args, ValueEnum};
use snafu::{ResultExt, Whatever, ensure_whatever};
use tidal_common_telemetry::{LogFormat, LoggingOptions};
use tidal_wave::{Plugin, StopReason, Wave, WaveConfig};
use tracing::info;

use crate::plugins::{EchoPlugin, ExecPlugin, Outcomes, SummaryPlugin};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Args)]
#[command(flatten_help = true)]
#[command(long_about = r"

Sweep items through a bounded pool of workers.
Examples:

tidal sweep web-1 web-2 web-3 --exec 'ping -c1 {}'

tidal sweep --file hosts.txt --concurrency 20 --repeat --wait 30s

")]
pub struct SweepArgs {
    /// Items to sweep, in order.
    pub items: Vec<String>,

    /// Read additional items from a file, one per line. Blank lines and
    /// lines starting with '#' are skipped.
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Maximum number of concurrent sessions. Defaults to the process
    /// parallelism.
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Pause between sweeps, e.g. "500ms", "30s", "5m".
    #[arg(short, long, default_value = "0s")]
    pub wait: humantime::Duration,

    /// Sweep again after each sweep until interrupted.
    #[arg(short, long)]
    pub repeat: bool,

    #[arg(short, long)]
    pub name: Option<String>,

    /// Shell command run per item; "{}" is replaced by the item.
    #[arg(short, long)]
    pub exec: Option<String>,

    /// Per-command time limit.
    #[arg(long, default_value = "60s")]
    pub timeout: humantime::Duration,

    #[arg(long, value_enum, default_value = "text")]
    pub log_format: LogFormatArg,

    /// Directory for rotated log files. Logs go to stdout only when unset.
    #[arg(long)]
    pub log_dir: Option<String>,

    /// Process-wide parallelism used as the default concurrency.
    #[arg(long)]
    pub parallelism: Option<usize>,
}

impl SweepArgs {
    pub fn logging_options(&self) -> LoggingOptions {
        LoggingOptions::builder()
            .dir(self.log_dir.clone().unwrap_or_default())
            .log_format(self.log_format.into())
            .build()
    }

    async fn load_items(&self) -> Result<Vec<String>, Whatever> {
        let mut items = self.items.clone();
        if let Some(path) = &self.file {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_whatever_context(|_| format!("Failed to read {}", path.display()))?;
            items.extend(parse_items(&content));
        }
        ensure_whatever!(!items.is_empty(), "No items to sweep");
        Ok(items)
    }

    fn wave_config(&self, items: Vec<String>) -> WaveConfig {
        let mut config = WaveConfig::builder()
            .items(items)
            .wait_interval(self.wait.into())
            .repeat(self.repeat)
            .build();
        if let Some(concurrency) = self.concurrency {
            config.set_concurrency(concurrency);
        }
        if let Some(name) = &self.name {
            config.set_name(name.clone());
        }
        config
    }

    pub async fn run(self) -> Result<(), Whatever> {
        let items = self.load_items().await?;
        let wave = Wave::new(self.wave_config(items));

        let outcomes = Arc::new(Outcomes::default());
        let session: Arc<dyn Plugin> = match &self.exec {
            Some(template) => Arc::new(ExecPlugin::new(
                template.clone(),
                self.timeout.into(),
                outcomes.clone(),
            )),
            None => Arc::new(EchoPlugin::new(outcomes.clone())),
        };
        wave.set_plugins(vec![session, Arc::new(SummaryPlugin::new(outcomes))]);

        let (stopped_tx, stopped_rx) = tokio::sync::oneshot::channel();
        let stopped_tx = std::sync::Mutex::new(Some(stopped_tx));
        wave.on_stop(move |reason| {
            if let Some(tx) = stopped_tx
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .take()
            {
                let _ = tx.send(reason);
            }
        });

        wave.start().await.whatever_context("Failed to start wave")?;

        tokio::select! {
            () = wave.wait() => {}
            () = shutdown_signal() => {
                info!(wave = %wave.name(), "Stopping; waiting for running sessions");
                wave.stop().await.whatever_context("Failed to stop wave")?;
            }
        }

        let reason = stopped_rx.await.unwrap_or(StopReason::Killed);
        info!(wave = %wave.name(), %reason, "Done");
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received terminate signal"),
    }
}

fn parse_items(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(ToOwned::to_owned)
}
