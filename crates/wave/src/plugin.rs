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

use std::{future::Future, sync::Arc};

use crate::context::WaveContext;

/// Set of event hooks invoked during a wave.
///
/// Only [`session`](Plugin::session) is required; the lifecycle hooks default
/// to no-ops.
///
/// # Threading
///
/// The engine never runs two lifecycle hooks (`init`, `start`, `pause`,
/// `unpause`, `end`) at the same time, across all plugins of a wave.
/// `session` is called from every worker, so it runs concurrently for
/// different items and may overlap lifecycle hooks. For one item the
/// plugins' `session` hooks run one after another in registration order.
///
/// Hooks are never interrupted. A hook that does not return stalls the
/// wave, so keep them bounded (e.g. with `tokio::time::timeout`).
///
/// # Reentrancy
///
/// Lifecycle hooks run while the wave holds its lifecycle lock. A plugin
/// that keeps a [`Wave`](crate::Wave) clone must not await
/// [`start`](crate::Wave::start), [`pause`](crate::Wave::pause),
/// [`resume`](crate::Wave::resume), [`stop`](crate::Wave::stop) or
/// [`finish`](crate::Wave::finish) from inside a lifecycle hook; that call
/// waits for the lock the hook is running under and never returns.
///
/// [`stop`](crate::Wave::stop), [`finish`](crate::Wave::finish) and
/// [`wait`](crate::Wave::wait) also wait for running sessions to finish, so
/// awaiting them from inside `session` waits on itself. Spawn the call
/// (e.g. `tokio::spawn(async move { wave.stop().await })`) instead.
#[async_trait::async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Plugin name for logging.
    fn name(&self) -> &'static str { std::any::type_name::<Self>() }

    /// Called once in the wave's lifetime, before the first sweep.
    async fn init(&self, _ctx: &WaveContext) {}

    /// Called when a sweep's workers have been launched.
    async fn start(&self, _ctx: &WaveContext) {}

    /// Called when the wave is paused mid-sweep.
    async fn pause(&self, _ctx: &WaveContext) {}

    /// Called when a paused wave resumes.
    async fn unpause(&self, _ctx: &WaveContext) {}

    /// Called when every item of a sweep has been processed.
    async fn end(&self, _ctx: &WaveContext) {}

    /// Called once per item per sweep.
    async fn session(&self, ctx: &WaveContext, item: &str);
}

/// Plugin list snapshot used by one sweep.
pub(crate) type Plugins = Arc<[Arc<dyn Plugin>]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub(crate) enum Hook {
    #[display("init")]
    Init,
    #[display("start")]
    Start,
    #[display("pause")]
    Pause,
    #[display("unpause")]
    Unpause,
    #[display("end")]
    End,
}

/// Run one lifecycle hook on every plugin in registration order.
///
/// Callers serialize lifecycle hooks through the wave's lifecycle lock.
pub(crate) async fn fire(plugins: &[Arc<dyn Plugin>], hook: Hook, ctx: &WaveContext) {
    for plugin in plugins {
        tracing::trace!(wave = ctx.name(), sweep = ctx.sweep(), plugin = plugin.name(), %hook, "Firing hook");
        match hook {
            Hook::Init => plugin.init(ctx).await,
            Hook::Start => plugin.start(ctx).await,
            Hook::Pause => plugin.pause(ctx).await,
            Hook::Unpause => plugin.unpause(ctx).await,
            Hook::End => plugin.end(ctx).await,
        }
    }
}

/// Adapts an async callback into a plugin with only a `session` hook.
pub struct FnPlugin<F> {
    callback: F,
}

impl<F> FnPlugin<F> {
    pub const fn new(callback: F) -> Self { FnPlugin { callback } }
}

#[async_trait::async_trait]
impl<F, Fut> Plugin for FnPlugin<F>
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn name(&self) -> &'static str { "callback" }

    async fn session(&self, _ctx: &WaveContext, item: &str) { (self.callback)(item.to_owned()).await }
}
