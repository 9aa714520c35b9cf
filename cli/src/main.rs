// Copyright 2024 The Braid Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::process::ExitCode;

use clap::Parser as _;

mod commands;

use commands::diff::DiffArgs;
use commands::merge::MergeArgs;

/// Contextual diff and three-way merge tools.
#[derive(clap::Parser, Debug)]
#[command(name = "braid", version)]
enum BraidCommand {
    Diff(DiffArgs),
    Merge(MergeArgs),
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("BRAID_LOG"))
        .with_writer(std::io::stderr)
        .init();

    let result = match BraidCommand::parse() {
        BraidCommand::Diff(args) => commands::diff::cmd_diff(&args),
        BraidCommand::Merge(args) => commands::merge::cmd_merge(&args),
    };
    match result {
        Ok(false) => ExitCode::SUCCESS,
        Ok(true) => ExitCode::from(1),
        Err(err) => {
            eprintln!("braid: {err}");
            ExitCode::from(2)
        }
    }
}
