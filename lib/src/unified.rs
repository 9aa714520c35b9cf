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

//! Unified-context diff rendering.
//!
//! Walks a two-way diff against the raw bytes of both sources and streams
//! unified output: `---`/`+++` headers, `@@` hunk headers with 1-based
//! starts (and the length omitted when it is 1), context around every
//! change, and the `\ No newline at end of file` annotation. Token bytes
//! are copied verbatim, embedded line endings included; only synthesized
//! lines use the configured output EOL.

use std::io::Write;

use bstr::BString;

use crate::diff::Diff;
use crate::diff::DiffResult;
use crate::diff::DiffSink;
use crate::diff::Segment;
use crate::memory::split_lines;

/// Default context radius around changes.
pub const DEFAULT_CONTEXT_SIZE: usize = 3;

/// The platform's text line ending.
pub const NATIVE_EOL: &str = if cfg!(windows) { "\r\n" } else { "\n" };

/// Writes `diff` in unified format, using the platform EOL for synthesized
/// lines. Produces no output at all when the sources do not differ.
pub fn write(
    out: &mut dyn Write,
    diff: &Diff,
    original: &[u8],
    modified: &[u8],
    original_header: &str,
    modified_header: &str,
    context_size: usize,
) -> DiffResult<()> {
    write_with_eol(
        out,
        diff,
        original,
        modified,
        original_header,
        modified_header,
        context_size,
        NATIVE_EOL,
    )
}

/// Like [`write`], with an explicit EOL for synthesized lines.
#[expect(clippy::too_many_arguments)]
pub fn write_with_eol(
    out: &mut dyn Write,
    diff: &Diff,
    original: &[u8],
    modified: &[u8],
    original_header: &str,
    modified_header: &str,
    context_size: usize,
    eol: &str,
) -> DiffResult<()> {
    if !diff.contains_diffs() {
        return Ok(());
    }
    write!(out, "--- {original_header}{eol}+++ {modified_header}{eol}")?;
    let mut writer = UnifiedWriter {
        out,
        sources: [SourceLines::new(original), SourceLines::new(modified)],
        next_token: 0,
        hunk: BString::default(),
        hunk_start: [0; 2],
        hunk_length: [0; 2],
        context_size,
        eol,
    };
    diff.output(&mut writer)?;
    writer.flush_hunk()
}

struct SourceLines<'a> {
    lines: Vec<&'a [u8]>,
    ends_without_eol: bool,
}

impl<'a> SourceLines<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self {
            lines: split_lines(bytes),
            ends_without_eol: bytes
                .last()
                .is_some_and(|&byte| byte != b'\n' && byte != b'\r'),
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum LineKind {
    Context,
    Delete,
    Insert,
}

impl LineKind {
    fn prefix(self) -> u8 {
        match self {
            Self::Context => b' ',
            Self::Delete => b'-',
            Self::Insert => b'+',
        }
    }
}

struct UnifiedWriter<'a> {
    out: &'a mut dyn Write,
    sources: [SourceLines<'a>; 2],
    /// Next original token not yet copied into the hunk.
    next_token: usize,
    hunk: BString,
    hunk_start: [usize; 2],
    hunk_length: [usize; 2],
    context_size: usize,
    eol: &'a str,
}

impl UnifiedWriter<'_> {
    /// Appends tokens `[first, past_last)` of one source to the hunk being
    /// built, with the prefix matching `kind`.
    fn append_range(&mut self, source_index: usize, kind: LineKind, first: usize, past_last: usize) {
        let source = &self.sources[source_index];
        let past_last = past_last.min(source.lines.len());
        let mut first = first;
        if source_index == 0 {
            // Context comes from the original; never back up over tokens the
            // hunk already contains.
            first = first.max(self.next_token);
        }
        if first >= past_last {
            return;
        }

        for line in &source.lines[first..past_last] {
            self.hunk.push(kind.prefix());
            self.hunk.extend_from_slice(line);
            match kind {
                LineKind::Context => {
                    self.hunk_length[0] += 1;
                    self.hunk_length[1] += 1;
                }
                LineKind::Delete => self.hunk_length[0] += 1,
                LineKind::Insert => self.hunk_length[1] += 1,
            }
        }
        if past_last == source.lines.len() && source.ends_without_eol {
            self.hunk.extend_from_slice(self.eol.as_bytes());
            self.hunk.extend_from_slice(b"\\ No newline at end of file");
            self.hunk.extend_from_slice(self.eol.as_bytes());
        }

        if source_index == 0 {
            self.next_token = past_last;
        }
    }

    fn flush_hunk(&mut self) -> DiffResult<()> {
        if self.hunk.is_empty() {
            return Ok(());
        }

        // Trailing context.
        let target = self.hunk_start[0] + self.hunk_length[0] + self.context_size;
        self.append_range(0, LineKind::Context, self.next_token, target);

        // 1-based line numbers, except that an empty side keeps start 0.
        for (start, length) in self.hunk_start.iter_mut().zip(self.hunk_length) {
            if length > 0 {
                *start += 1;
            }
        }
        // A hunk length of 1 is implied by its absence.
        write!(self.out, "@@ -{}", self.hunk_start[0])?;
        if self.hunk_length[0] != 1 {
            write!(self.out, ",{}", self.hunk_length[0])?;
        }
        write!(self.out, " +{}", self.hunk_start[1])?;
        if self.hunk_length[1] != 1 {
            write!(self.out, ",{}", self.hunk_length[1])?;
        }
        write!(self.out, " @@{}", self.eol)?;
        self.out.write_all(&self.hunk)?;

        self.hunk_length = [0; 2];
        self.hunk.clear();
        Ok(())
    }
}

impl DiffSink for UnifiedWriter<'_> {
    fn diff_modified(&mut self, segment: &Segment) -> DiffResult<()> {
        let target_original = segment.original.start.saturating_sub(self.context_size);
        let target_modified = segment.modified.start;

        // If this change is too far from the current hunk for their context
        // windows to touch, flush and start a new hunk.
        if self.next_token + self.context_size < target_original {
            self.flush_hunk()?;
        }
        // A fresh hunk takes up to `context_size` leading context tokens;
        // a continued hunk takes the whole gap since its last change.
        let context_first = if self.hunk_length == [0, 0] {
            self.hunk_start[0] = target_original;
            self.hunk_start[1] = (target_modified + target_original) - segment.original.start;
            target_original
        } else {
            self.next_token
        };
        self.append_range(0, LineKind::Context, context_first, segment.original.start);
        self.append_range(
            0,
            LineKind::Delete,
            segment.original.start,
            segment.original.end(),
        );
        self.append_range(
            1,
            LineKind::Insert,
            segment.modified.start,
            segment.modified.end(),
        );
        Ok(())
    }
}
