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

use clap::{Parser, Subcommand};
use snafu::{ResultExt, Whatever};
use tidal_common_runtime::{GlobalRuntimeOptions, RuntimeOptions};

mod build_info;
mod plugins;
mod sweep;

use sweep::SweepArgs;

#[derive(Debug, Parser)]
#[clap(
name = "tidal",
about= "Sweep a list of hosts with bounded concurrency",
author = build_info::AUTHOR,
version = build_info::FULL_VERSION)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Sweep(SweepArgs),
}

fn main() -> Result<(), Whatever> {
    let cli = Cli::parse();
    match cli.commands {
        Commands::Sweep(args) => {
            let _guards = tidal_common_telemetry::init_global_logging("tidal", &args.logging_options());
            tidal_common_telemetry::set_panic_hook();

            let global = GlobalRuntimeOptions::builder()
                .maybe_parallelism(args.parallelism)
                .build();
            tidal_common_runtime::init_global_runtimes(&global)
                .whatever_context("Failed to initialize runtimes")?;

            let runtime = RuntimeOptions::default()
                .create()
                .whatever_context("Failed to create runtime")?;
            runtime.block_on(args.run())
        }
    }
}
