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

//! Merged-file rendering with conflict markers.
//!
//! Walks a three- or four-way diff and streams the chosen tokens: modified
//! bytes where only the modified side changed (or nothing changed), latest
//! bytes where the latest side changed or both sides agree, and a marked-up
//! conflict block where they disagree. Tokens are copied verbatim; marker
//! lines end with the line ending detected from the modified source,
//! falling back to the platform's.

use std::collections::VecDeque;
use std::io::Write;

use bstr::BString;

use crate::diff::Diff;
use crate::diff::DiffError;
use crate::diff::DiffResult;
use crate::diff::DiffSink;
use crate::diff::Segment;
use crate::diff::TokenRange;
use crate::diff::output_segments;
use crate::memory::split_lines;
use crate::unified::DEFAULT_CONTEXT_SIZE;

/// A line-ending style.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineEnding {
    /// `\n`.
    Lf,
    /// `\r`.
    Cr,
    /// `\r\n`.
    CrLf,
}

impl LineEnding {
    /// The bytes of this line ending.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::Cr => "\r",
            Self::CrLf => "\r\n",
        }
    }

    /// The platform's text line ending.
    pub fn native() -> Self {
        if cfg!(windows) { Self::CrLf } else { Self::Lf }
    }

    /// The style of the first line ending in `bytes`, if there is one.
    ///
    /// A `\r` as the very last byte counts as a CR-only file; that is
    /// correct for whole files and no more likely to be wrong than right
    /// for anything else.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        let first = bytes
            .iter()
            .position(|&byte| byte == b'\n' || byte == b'\r')?;
        match bytes[first] {
            b'\n' => Some(Self::Lf),
            _ if bytes.get(first + 1) == Some(&b'\n') => Some(Self::CrLf),
            _ => Some(Self::Cr),
        }
    }
}

/// How the merge renderer picks the line ending for its marker lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MarkerEol {
    /// Detect from the modified source, falling back to the platform EOL.
    #[default]
    Auto,
    /// Detect from the modified source; fail with
    /// [`DiffError::UnknownEol`] if it has no line ending at all.
    Preserve,
    /// Use the given line ending.
    Fixed(LineEnding),
}

/// How conflicting regions are displayed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConflictDisplayStyle {
    /// Modified and latest sides between markers.
    #[default]
    ModifiedLatest,
    /// Like [`ModifiedLatest`](Self::ModifiedLatest), but where a conflict
    /// has been refined, only the still-conflicting pieces get markers.
    ResolvedModifiedLatest,
    /// Modified, original and latest sides between markers.
    ModifiedOriginalLatest,
    /// Conflicts resolve to the modified side, without markers.
    Modified,
    /// Conflicts resolve to the latest side, without markers.
    Latest,
    /// Only conflicts are emitted, with three-way markers, positional
    /// labels and a little context under `@@` headers.
    OnlyConflicts,
}

/// Options for merged output.
#[derive(Clone, Debug, Default)]
pub struct MergeOptions {
    /// Conflict display style.
    pub style: ConflictDisplayStyle,
    /// Label on `|||||||` marker lines; defaults to `original`.
    pub original_label: Option<String>,
    /// Label on `<<<<<<<` marker lines; defaults to `modified`.
    pub modified_label: Option<String>,
    /// Label on `>>>>>>>` marker lines; defaults to `latest`.
    pub latest_label: Option<String>,
    /// Marker line-ending policy.
    pub marker_eol: MarkerEol,
}

/// Writes a three- or four-way `diff` as a merged file.
pub fn write(
    out: &mut dyn Write,
    diff: &Diff,
    original: &[u8],
    modified: &[u8],
    latest: &[u8],
    options: &MergeOptions,
) -> DiffResult<()> {
    let eol = match options.marker_eol {
        MarkerEol::Auto => LineEnding::detect(modified).unwrap_or_else(LineEnding::native),
        MarkerEol::Preserve => LineEnding::detect(modified).ok_or(DiffError::UnknownEol)?,
        MarkerEol::Fixed(eol) => eol,
    };
    let label = |label: &Option<String>, default: &str| {
        label.clone().unwrap_or_else(|| default.to_owned())
    };
    let mut writer = MergeWriter {
        out,
        sources: [
            split_lines(original),
            split_lines(modified),
            split_lines(latest),
        ],
        style: options.style,
        markers: [
            format!("<<<<<<< {}", label(&options.modified_label, "modified")).into(),
            format!("||||||| {}", label(&options.original_label, "original")).into(),
            "=======".into(),
            format!(">>>>>>> {}", label(&options.latest_label, "latest")).into(),
        ],
        eol: eol.as_str(),
        context_size: DEFAULT_CONTEXT_SIZE,
        pending: VecDeque::new(),
        trailing: 0,
        since_conflict: 0,
        in_hunk: false,
    };
    diff.output(&mut writer)
}

#[derive(Clone, Copy)]
enum Marker {
    Modified = 0,
    Original = 1,
    Separator = 2,
    Latest = 3,
}

struct MergeWriter<'a> {
    out: &'a mut dyn Write,
    /// Token slices of the original, modified and latest sources.
    sources: [Vec<&'a [u8]>; 3],
    style: ConflictDisplayStyle,
    /// Marker lines without their EOL, indexed by [`Marker`].
    markers: [BString; 4],
    eol: &'static str,
    context_size: usize,
    /// Buffered candidates for leading context, newest last.
    pending: VecDeque<(usize, usize)>,
    /// Trailing context tokens still owed after a conflict block.
    trailing: usize,
    /// Merged tokens seen since the last conflict block.
    since_conflict: usize,
    in_hunk: bool,
}

impl MergeWriter<'_> {
    fn emit_tokens(&mut self, source: usize, range: TokenRange) -> DiffResult<()> {
        for line in &self.sources[source][range.start..range.end()] {
            self.out.write_all(line)?;
        }
        Ok(())
    }

    /// Emits a non-conflicting range: verbatim in the full styles, into the
    /// context machinery in the only-conflicts style.
    fn merged_range(&mut self, source: usize, range: TokenRange) -> DiffResult<()> {
        if self.style != ConflictDisplayStyle::OnlyConflicts {
            return self.emit_tokens(source, range);
        }
        for index in range.start..range.end() {
            if self.trailing > 0 {
                self.trailing -= 1;
                self.out.write_all(self.sources[source][index])?;
            } else {
                self.pending.push_back((source, index));
                if self.pending.len() > self.context_size {
                    self.pending.pop_front();
                }
            }
            self.since_conflict += 1;
        }
        Ok(())
    }

    fn write_marker(&mut self, marker: Marker, range: Option<TokenRange>) -> DiffResult<()> {
        self.out.write_all(&self.markers[marker as usize])?;
        if let Some(range) = range {
            write!(self.out, " ({},{})", range.start + 1, range.len)?;
        }
        self.out.write_all(self.eol.as_bytes())?;
        Ok(())
    }

    /// `<<<<<<<` modified `=======` latest `>>>>>>>`.
    fn write_two_way_conflict(&mut self, segment: &Segment) -> DiffResult<()> {
        self.write_marker(Marker::Modified, None)?;
        self.emit_tokens(1, segment.modified)?;
        self.write_marker(Marker::Separator, None)?;
        self.emit_tokens(2, segment.latest)?;
        self.write_marker(Marker::Latest, None)
    }

    /// `<<<<<<<` modified `|||||||` original `=======` latest `>>>>>>>`,
    /// optionally with `(start,length)` on the labelled markers.
    fn write_three_way_conflict(
        &mut self,
        segment: &Segment,
        with_ranges: bool,
    ) -> DiffResult<()> {
        let range = |range: TokenRange| with_ranges.then_some(range);
        self.write_marker(Marker::Modified, range(segment.modified))?;
        self.emit_tokens(1, segment.modified)?;
        self.write_marker(Marker::Original, range(segment.original))?;
        self.emit_tokens(0, segment.original)?;
        self.write_marker(Marker::Separator, None)?;
        self.emit_tokens(2, segment.latest)?;
        self.write_marker(Marker::Latest, range(segment.latest))
    }

    /// Starts or continues an only-conflicts hunk and emits the buffered
    /// leading context.
    fn begin_conflict_hunk(&mut self) -> DiffResult<()> {
        // Two conflicts whose context windows cannot touch go in separate
        // hunks.
        if !self.in_hunk || self.since_conflict > 2 * self.context_size {
            write!(self.out, "@@{}", self.eol)?;
        }
        self.in_hunk = true;
        while let Some((source, index)) = self.pending.pop_front() {
            self.out.write_all(self.sources[source][index])?;
        }
        self.since_conflict = 0;
        Ok(())
    }
}

impl DiffSink for MergeWriter<'_> {
    fn common(&mut self, segment: &Segment) -> DiffResult<()> {
        self.merged_range(1, segment.modified)
    }

    fn diff_modified(&mut self, segment: &Segment) -> DiffResult<()> {
        self.merged_range(1, segment.modified)
    }

    fn diff_latest(&mut self, segment: &Segment) -> DiffResult<()> {
        self.merged_range(2, segment.latest)
    }

    fn diff_common(&mut self, segment: &Segment) -> DiffResult<()> {
        // Modified and latest agree here; the latest bytes are the ones
        // emitted.
        self.merged_range(2, segment.latest)
    }

    fn conflict(&mut self, segment: &Segment) -> DiffResult<()> {
        match self.style {
            ConflictDisplayStyle::Modified => self.emit_tokens(1, segment.modified),
            ConflictDisplayStyle::Latest => self.emit_tokens(2, segment.latest),
            ConflictDisplayStyle::ResolvedModifiedLatest
                if segment.resolved.is_some() =>
            {
                let resolved = segment.resolved.as_ref().expect("checked above");
                output_segments(resolved, self)
            }
            ConflictDisplayStyle::ModifiedLatest
            | ConflictDisplayStyle::ResolvedModifiedLatest => {
                self.write_two_way_conflict(segment)
            }
            ConflictDisplayStyle::ModifiedOriginalLatest => {
                self.write_three_way_conflict(segment, false)
            }
            ConflictDisplayStyle::OnlyConflicts => {
                self.begin_conflict_hunk()?;
                self.write_three_way_conflict(segment, true)?;
                self.trailing = self.context_size;
                Ok(())
            }
        }
    }
}
