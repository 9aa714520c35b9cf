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

use std::path::PathBuf;

use braid_lib::diff::DiffResult;
use braid_lib::file;
use braid_lib::file::DiffFileOptions;
use braid_lib::file::IgnoreSpace;
use braid_lib::source::Cancellation;
use tracing::instrument;

/// Print the differences between two files in unified format
///
/// Exits with 0 when the files do not differ, 1 when they do, and 2 on
/// error.
#[derive(clap::Args, Debug)]
pub(crate) struct DiffArgs {
    /// Ignore changes in the amount of white space
    #[arg(short = 'b', long = "ignore-space-change")]
    ignore_space_change: bool,
    /// Ignore all white space
    #[arg(short = 'w', long = "ignore-all-space")]
    ignore_all_space: bool,
    /// Treat LF, CR and CRLF line endings as equal
    #[arg(long)]
    ignore_eol_style: bool,
    /// Output in unified format (accepted for compatibility; unified is the
    /// only supported format)
    #[arg(short = 'u', long = "unified")]
    unified: bool,
    /// The older file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    original: PathBuf,
    /// The newer file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    modified: PathBuf,
}

#[instrument(skip_all)]
pub(crate) fn cmd_diff(args: &DiffArgs) -> DiffResult<bool> {
    let _ = args.unified;
    let options = DiffFileOptions {
        ignore_space: if args.ignore_all_space {
            IgnoreSpace::All
        } else if args.ignore_space_change {
            IgnoreSpace::Change
        } else {
            IgnoreSpace::None
        },
        ignore_eol_style: args.ignore_eol_style,
        ..DiffFileOptions::default()
    };

    let diff = file::diff(&args.original, &args.modified, &options, Cancellation::NONE)?;
    let stdout = std::io::stdout();
    file::write_unified(
        &mut stdout.lock(),
        &diff,
        &args.original,
        &args.modified,
        None,
        None,
        &options,
    )?;
    Ok(diff.contains_diffs())
}
