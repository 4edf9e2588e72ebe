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

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to build tokio runtime {name}"))]
    Build {
        name:   String,
        source: std::io::Error,
        #[snafu(implicit)]
        loc:    snafu::Location,
    },

    /// Global options can only be set once, before anything reads them.
    #[snafu(display("Global runtime options were already initialized"))]
    AlreadyInitialized {
        #[snafu(implicit)]
        loc: snafu::Location,
    },
}
