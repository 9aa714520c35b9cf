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

//! Token source over in-memory byte buffers.
//!
//! Tokens are line slices borrowed straight from the caller's buffers; no
//! bytes are copied and no normalization is applied. Callers wanting
//! whitespace- or EOL-insensitive comparison of in-memory data normalize
//! upstream.

use std::cmp::Ordering;

use crate::diff::Diff;
use crate::diff::DiffResult;
use crate::source::Cancellation;
use crate::source::ScanDirection;
use crate::source::SourceKind;
use crate::source::TokenSource;
use crate::token::adler32;

/// Splits `bytes` into lines, each including its terminator.
///
/// A terminator is `\n`, `\r` or `\r\n`; a `\r\n` pair is never split. A
/// trailing line without a terminator is a valid final line.
pub fn split_lines(bytes: &[u8]) -> Vec<&[u8]> {
    let mut lines = vec![];
    let mut start = 0;
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'\r' => {
                if bytes.get(index + 1) == Some(&b'\n') {
                    index += 1;
                }
                lines.push(&bytes[start..=index]);
                start = index + 1;
            }
            b'\n' => {
                lines.push(&bytes[start..=index]);
                start = index + 1;
            }
            _ => {}
        }
        index += 1;
    }
    if start < bytes.len() {
        lines.push(&bytes[start..]);
    }
    lines
}

struct ByteStream<'a> {
    lines: Vec<&'a [u8]>,
    /// Next line for forward reads.
    next: usize,
    /// Exclusive end for forward reads; lowered by the backward suffix scan.
    back: usize,
}

impl<'a> ByteStream<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        let lines = split_lines(bytes);
        let back = lines.len();
        Self {
            lines,
            next: 0,
            back,
        }
    }
}

/// [`TokenSource`] over up to four byte buffers.
pub struct ByteSource<'a> {
    streams: [Option<ByteStream<'a>>; 4],
}

impl<'a> ByteSource<'a> {
    /// Source for a two-way diff.
    pub fn two(original: &'a [u8], modified: &'a [u8]) -> Self {
        Self {
            streams: [
                Some(ByteStream::new(original)),
                Some(ByteStream::new(modified)),
                None,
                None,
            ],
        }
    }

    /// Source for a three-way diff.
    pub fn three(original: &'a [u8], modified: &'a [u8], latest: &'a [u8]) -> Self {
        Self {
            streams: [
                Some(ByteStream::new(original)),
                Some(ByteStream::new(modified)),
                Some(ByteStream::new(latest)),
                None,
            ],
        }
    }

    /// Source for a four-way diff.
    pub fn four(
        original: &'a [u8],
        modified: &'a [u8],
        latest: &'a [u8],
        ancestor: &'a [u8],
    ) -> Self {
        Self {
            streams: [
                Some(ByteStream::new(original)),
                Some(ByteStream::new(modified)),
                Some(ByteStream::new(latest)),
                Some(ByteStream::new(ancestor)),
            ],
        }
    }

    fn stream(&mut self, kind: SourceKind) -> &mut ByteStream<'a> {
        self.streams[kind.index()]
            .as_mut()
            .expect("datasource was not provided")
    }
}

impl<'a> TokenSource for ByteSource<'a> {
    type Token = &'a [u8];

    fn open(&mut self, kind: SourceKind, direction: ScanDirection) -> DiffResult<()> {
        let stream = self.stream(kind);
        match direction {
            ScanDirection::Forward => stream.next = 0,
            ScanDirection::Backward => {
                stream.next = 0;
                stream.back = stream.lines.len();
            }
        }
        Ok(())
    }

    fn close(&mut self, _kind: SourceKind) -> DiffResult<()> {
        Ok(())
    }

    fn next_token(&mut self, kind: SourceKind) -> DiffResult<Option<(u32, Self::Token)>> {
        let stream = self.stream(kind);
        if stream.next >= stream.back {
            return Ok(None);
        }
        let line = stream.lines[stream.next];
        stream.next += 1;
        Ok(Some((adler32(0, line), line)))
    }

    fn previous_token(&mut self, kind: SourceKind) -> DiffResult<Option<Self::Token>> {
        let stream = self.stream(kind);
        if stream.back == 0 {
            return Ok(None);
        }
        stream.back -= 1;
        Ok(Some(stream.lines[stream.back]))
    }

    fn push_back_prefix(&mut self, kind: SourceKind, _token: Self::Token) -> DiffResult<()> {
        let stream = self.stream(kind);
        stream.next -= 1;
        Ok(())
    }

    fn push_back_suffix(&mut self, kind: SourceKind, _token: Self::Token) -> DiffResult<()> {
        let stream = self.stream(kind);
        stream.back += 1;
        Ok(())
    }

    fn compare(&mut self, a: &Self::Token, b: &Self::Token) -> DiffResult<Ordering> {
        // Size first; only equally long lines are compared byte for byte.
        Ok(a.len().cmp(&b.len()).then_with(|| a.cmp(b)))
    }

    fn supports_trim(&self) -> bool {
        true
    }
}

/// Computes the difference between two byte buffers.
pub fn diff(original: &[u8], modified: &[u8], cancel: Cancellation) -> DiffResult<Diff> {
    let mut source = ByteSource::two(original, modified);
    Diff::two_way(&mut source, cancel)
}

/// Computes the three-way difference between byte buffers.
pub fn diff3(
    original: &[u8],
    modified: &[u8],
    latest: &[u8],
    cancel: Cancellation,
) -> DiffResult<Diff> {
    let mut source = ByteSource::three(original, modified, latest);
    Diff::three_way(&mut source, cancel)
}

/// Computes the four-way difference between byte buffers.
pub fn diff4(
    original: &[u8],
    modified: &[u8],
    latest: &[u8],
    ancestor: &[u8],
    cancel: Cancellation,
) -> DiffResult<Diff> {
    let mut source = ByteSource::four(original, modified, latest, ancestor);
    Diff::four_way(&mut source, cancel)
}
