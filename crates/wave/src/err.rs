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

use snafu::Snafu;

/// Result type for wave operations.
pub type Result<T, E = WaveError> = std::result::Result<T, E>;

/// Errors surfaced to the caller by the wave handle.
///
/// All variants are local and recoverable; the engine never retries them.
/// Plugin hooks are infallible from the engine's point of view and cannot
/// produce any of these.
///
/// # Example
///
/// ```rust
/// use tidal_wave::{Wave, WaveConfig, WaveError};
///
/// # #[tokio::main]
/// # async fn main() {
/// let wave = Wave::new(WaveConfig::builder().items(vec!["a".into()]).concurrency(0).build());
/// match wave.start().await {
///     Err(WaveError::InvalidConfiguration { reason, .. }) => println!("rejected: {reason}"),
///     other => panic!("unexpected: {other:?}"),
/// }
/// # }
/// ```
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum WaveError {
    /// Concurrency below one or an empty name.
    #[snafu(display("Invalid wave configuration: {reason}"))]
    InvalidConfiguration {
        reason: String,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    #[snafu(display("Wave {name} is already paused"))]
    AlreadyPaused {
        name: String,
        #[snafu(implicit)]
        loc:  snafu::Location,
    },

    #[snafu(display("Wave {name} was never started"))]
    NeverStarted {
        name: String,
        #[snafu(implicit)]
        loc:  snafu::Location,
    },

    /// The wave has stopped for good; a new handle is needed.
    #[snafu(display("Wave {name} has stopped"))]
    Stopped {
        name: String,
        #[snafu(implicit)]
        loc:  snafu::Location,
    },
}
