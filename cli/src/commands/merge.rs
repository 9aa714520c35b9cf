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

use braid_lib::diff::DiffError;
use braid_lib::diff::DiffResult;
use braid_lib::file;
use braid_lib::file::DiffFileOptions;
use braid_lib::file::IgnoreSpace;
use braid_lib::merge::ConflictDisplayStyle;
use braid_lib::merge::MergeOptions;
use braid_lib::source::Cancellation;
use tracing::instrument;

/// Merge the changes between an original and a latest file into a modified
/// file
///
/// Performs a three-way merge and prints the merged result, marking
/// conflicting regions according to `--conflict-style`. With `--ancestor`,
/// a four-way merge pre-aligns the modified file through a separate common
/// ancestor. Exits with 0 when the sources do not differ, 1 when they do,
/// and 2 on error.
#[derive(clap::Args, Debug)]
pub(crate) struct MergeArgs {
    /// How conflicting regions are displayed
    #[arg(long, value_enum, default_value_t = ConflictStyleArg::ModifiedLatest)]
    conflict_style: ConflictStyleArg,
    /// Conflict marker label; may be repeated up to three times for the
    /// modified, original and latest sides, in that order
    #[arg(short = 'L', long = "label", value_name = "LABEL")]
    labels: Vec<String>,
    /// Common ancestor of the modified and latest files (four-way merge)
    #[arg(long, value_hint = clap::ValueHint::FilePath)]
    ancestor: Option<PathBuf>,
    /// Ignore changes in the amount of white space
    #[arg(short = 'b', long = "ignore-space-change")]
    ignore_space_change: bool,
    /// Ignore all white space
    #[arg(short = 'w', long = "ignore-all-space")]
    ignore_all_space: bool,
    /// Treat LF, CR and CRLF line endings as equal
    #[arg(long)]
    ignore_eol_style: bool,
    /// The original file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    original: PathBuf,
    /// The locally modified file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    modified: PathBuf,
    /// The latest file
    #[arg(value_hint = clap::ValueHint::FilePath)]
    latest: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum ConflictStyleArg {
    /// Conflicts show the modified and latest sides
    ModifiedLatest,
    /// Like modified-latest, but refined conflicts only mark the pieces
    /// that still disagree
    ResolvedModifiedLatest,
    /// Conflicts show the modified, original and latest sides
    ModifiedOriginalLatest,
    /// Conflicts resolve to the modified side
    Modified,
    /// Conflicts resolve to the latest side
    Latest,
    /// Emit only the conflicting regions
    OnlyConflicts,
}

impl From<ConflictStyleArg> for ConflictDisplayStyle {
    fn from(style: ConflictStyleArg) -> Self {
        match style {
            ConflictStyleArg::ModifiedLatest => Self::ModifiedLatest,
            ConflictStyleArg::ResolvedModifiedLatest => Self::ResolvedModifiedLatest,
            ConflictStyleArg::ModifiedOriginalLatest => Self::ModifiedOriginalLatest,
            ConflictStyleArg::Modified => Self::Modified,
            ConflictStyleArg::Latest => Self::Latest,
            ConflictStyleArg::OnlyConflicts => Self::OnlyConflicts,
        }
    }
}

#[instrument(skip_all)]
pub(crate) fn cmd_merge(args: &MergeArgs) -> DiffResult<bool> {
    if args.labels.len() > 3 {
        return Err(DiffError::InvalidOption(format!(
            "-L {}",
            args.labels[3]
        )));
    }
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

    let diff = match &args.ancestor {
        Some(ancestor) => file::diff4(
            &args.original,
            &args.modified,
            &args.latest,
            ancestor,
            &options,
            Cancellation::NONE,
        )?,
        None => file::diff3(
            &args.original,
            &args.modified,
            &args.latest,
            &options,
            Cancellation::NONE,
        )?,
    };

    let mut labels = args.labels.iter().cloned();
    let merge_options = MergeOptions {
        style: args.conflict_style.into(),
        modified_label: labels.next(),
        original_label: labels.next(),
        latest_label: labels.next(),
        ..MergeOptions::default()
    };
    let stdout = std::io::stdout();
    file::write_merge(
        &mut stdout.lock(),
        &diff,
        &args.original,
        &args.modified,
        &args.latest,
        &merge_options,
    )?;
    Ok(diff.contains_diffs())
}
