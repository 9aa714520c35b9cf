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

//! The diff result model and the two-way diff.
//!
//! A diff is an ordered list of [`Segment`]s covering the compared sources
//! without gap or overlap. Renderers consume segments through the
//! [`DiffSink`] trait; a sink method left at its default is silently
//! skipped, so a renderer only implements the callbacks it cares about.

use std::path::PathBuf;

use thiserror::Error;

use crate::lcs;
use crate::lcs::LcsRec;
use crate::source::Cancellation;
use crate::source::SourceKind;
use crate::source::TokenSource;
use crate::token;
use crate::token::PositionRec;

/// Error type for diff computation and rendering.
#[derive(Debug, Error)]
pub enum DiffError {
    /// A token provider or output sink reported an I/O failure.
    #[error("failed to read datasource")]
    DatasourceIo(#[from] std::io::Error),
    /// The bytes backing a datasource changed while the diff was running.
    #[error("the file '{path}' changed unexpectedly during diff")]
    DatasourceModified {
        /// Path of the file that changed under the diff.
        path: PathBuf,
    },
    /// An option argument could not be parsed.
    #[error("invalid argument '{0}' in diff options")]
    InvalidOption(String),
    /// The line-ending style of a source could not be detected.
    #[error("cannot determine the line ending style")]
    UnknownEol,
    /// The caller's cancellation check fired.
    #[error("diff computation cancelled")]
    Cancelled,
}

/// Result alias used throughout the engine.
pub type DiffResult<T> = Result<T, DiffError>;

/// A contiguous run of tokens in one source, 0-based.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenRange {
    /// Index of the first token covered.
    pub start: usize,
    /// Number of tokens covered.
    pub len: usize,
}

impl TokenRange {
    pub(crate) fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    /// Index one past the last token covered.
    pub fn end(&self) -> usize {
        self.start + self.len
    }
}

/// Classifies what a [`Segment`] says about its ranges.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    /// Identical in all sources present.
    Common,
    /// Only the modified side differs from the original.
    Modified,
    /// Only the latest side differs from the original (three-way only).
    Latest,
    /// Modified and latest both differ from the original but agree with
    /// each other (three-way only).
    DiffCommon,
    /// Modified and latest both differ from the original and from each
    /// other (three-way only).
    Conflict,
}

/// One record of a diff result.
#[derive(Clone, Debug)]
pub struct Segment {
    /// What this segment says about its ranges.
    pub kind: SegmentKind,
    /// Covered tokens of the original source.
    pub original: TokenRange,
    /// Covered tokens of the modified source.
    pub modified: TokenRange,
    /// Covered tokens of the latest source; empty for two-way diffs.
    pub latest: TokenRange,
    /// For [`SegmentKind::Conflict`], a sub-segment list refining the
    /// conflict into nested common and conflicting pieces.
    pub resolved: Option<Vec<Segment>>,
}

/// The difference between two or three datasources.
#[derive(Clone, Debug)]
pub struct Diff {
    segments: Vec<Segment>,
}

impl Diff {
    /// Computes the difference between the `Original` and `Modified`
    /// datasources of `source`.
    pub fn two_way<S: TokenSource>(source: &mut S, cancel: Cancellation) -> DiffResult<Self> {
        let rings = token::build_rings(
            source,
            &[SourceKind::Original, SourceKind::Modified],
        )?;
        let mut positions = rings.positions;
        let mut lcs_arena = vec![];
        let head = lcs::compute(
            &mut positions,
            &mut lcs_arena,
            rings.tails[0],
            rings.tails[1],
            rings.prefix_lines,
            rings.suffix_lines,
            cancel,
        )?;
        let segments = lcs_to_segments(&positions, &lcs_arena, head, 1, 1, true);
        tracing::debug!(segments = segments.len(), "computed two-way diff");
        Ok(Self { segments })
    }

    /// Computes the three-way difference between the `Original`, `Modified`
    /// and `Latest` datasources of `source`.
    pub fn three_way<S: TokenSource>(source: &mut S, cancel: Cancellation) -> DiffResult<Self> {
        crate::diff3::three_way(source, cancel)
    }

    /// Computes the four-way variant over `Original`, `Modified`, `Latest`
    /// and `Ancestor`, using the ancestor to pre-align the modified source.
    pub fn four_way<S: TokenSource>(source: &mut S, cancel: Cancellation) -> DiffResult<Self> {
        crate::diff4::four_way(source, cancel)
    }

    pub(crate) fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// The segments of this diff, ordered by original start.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Whether any segment is a conflict.
    pub fn contains_conflicts(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| segment.kind == SegmentKind::Conflict)
    }

    /// Whether the datasources differ at all.
    pub fn contains_diffs(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| segment.kind != SegmentKind::Common)
    }

    /// Dispatches every segment to the matching `sink` method, in order.
    pub fn output(&self, sink: &mut dyn DiffSink) -> DiffResult<()> {
        output_segments(&self.segments, sink)
    }
}

/// Consumes a diff segment by segment.
///
/// The default methods do nothing, mirroring an output vtable with empty
/// slots: a unified-diff printer implements only
/// [`diff_modified`](Self::diff_modified), a merge writer implements all
/// five.
pub trait DiffSink {
    /// An identical range across all sources present.
    fn common(&mut self, segment: &Segment) -> DiffResult<()> {
        let _ = segment;
        Ok(())
    }

    /// The modified source differs from the original here.
    fn diff_modified(&mut self, segment: &Segment) -> DiffResult<()> {
        let _ = segment;
        Ok(())
    }

    /// The latest source differs from the original here.
    fn diff_latest(&mut self, segment: &Segment) -> DiffResult<()> {
        let _ = segment;
        Ok(())
    }

    /// Modified and latest agree with each other against the original here.
    fn diff_common(&mut self, segment: &Segment) -> DiffResult<()> {
        let _ = segment;
        Ok(())
    }

    /// All sources disagree here; `segment.resolved` may refine the region.
    fn conflict(&mut self, segment: &Segment) -> DiffResult<()> {
        let _ = segment;
        Ok(())
    }
}

/// Dispatches `segments` to `sink`; also used by renderers to recurse into
/// a conflict's resolved sub-segments.
pub fn output_segments(segments: &[Segment], sink: &mut dyn DiffSink) -> DiffResult<()> {
    for segment in segments {
        match segment.kind {
            SegmentKind::Common => sink.common(segment)?,
            SegmentKind::Modified => sink.diff_modified(segment)?,
            SegmentKind::Latest => sink.diff_latest(segment)?,
            SegmentKind::DiffCommon => sink.diff_common(segment)?,
            SegmentKind::Conflict => sink.conflict(segment)?,
        }
    }
    Ok(())
}

/// Converts an LCS run list into a two-way segment list.
///
/// Cursors start at the given 1-based offsets; every gap before a run
/// becomes a `Modified` segment and, when `want_common` is set, every run
/// becomes a `Common` segment. The zero-length EOF run contributes the
/// trailing gap and terminates the walk.
pub(crate) fn lcs_to_segments(
    positions: &[PositionRec],
    lcs: &[LcsRec],
    head: usize,
    original_start: usize,
    modified_start: usize,
    want_common: bool,
) -> Vec<Segment> {
    let mut segments = vec![];
    let mut original_start = original_start;
    let mut modified_start = modified_start;
    let mut current = Some(head);
    while let Some(id) = current {
        let run = &lcs[id];
        let run_start0 = positions[run.positions[0]].offset;
        let run_start1 = positions[run.positions[1]].offset;
        if original_start < run_start0 || modified_start < run_start1 {
            segments.push(Segment {
                kind: SegmentKind::Modified,
                original: TokenRange::new(original_start - 1, run_start0 - original_start),
                modified: TokenRange::new(modified_start - 1, run_start1 - modified_start),
                latest: TokenRange::default(),
                resolved: None,
            });
        }
        if run.length == 0 {
            break;
        }
        if want_common {
            segments.push(Segment {
                kind: SegmentKind::Common,
                original: TokenRange::new(run_start0 - 1, run.length),
                modified: TokenRange::new(run_start1 - 1, run.length),
                latest: TokenRange::default(),
                resolved: None,
            });
        }
        original_start = run_start0 + run.length;
        modified_start = run_start1 + run.length;
        current = run.next;
    }
    segments
}
