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

use derive_more::{Debug, Display};
use uuid::Uuid;

/// Unique identity of a wave handle, stable for its whole lifetime.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[debug("WaveId({_0})")]
#[display("{_0}")]
pub struct WaveId(Uuid);

impl WaveId {
    pub(crate) fn new() -> Self { Self(Uuid::new_v4()) }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid { &self.0 }

    /// Label used when the caller does not name the wave.
    pub(crate) fn default_name(&self) -> String {
        let simple = self.0.simple().to_string();
        format!("wave-{}", &simple[..8])
    }
}
