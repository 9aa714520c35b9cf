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

//! Token source over files on disk.
//!
//! Files are read in fixed-size chunks and tokenized into lines without
//! ever holding a whole file in memory. A token remembers only where its
//! bytes live; equality first compares normalized lengths and then re-reads
//! the bytes from disk. Comparison options (whitespace, line-ending style)
//! are applied through the normalizer as bytes stream by.

use std::cmp::Ordering;
use std::fs;
use std::fs::File;
use std::io::Read as _;
use std::io::Seek as _;
use std::io::SeekFrom;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use chrono::DateTime;
use chrono::Local;

use crate::diff::Diff;
use crate::diff::DiffError;
use crate::diff::DiffResult;
use crate::merge;
use crate::merge::MergeOptions;
use crate::normalize::NormalizeState;
use crate::normalize::normalize_buffer;
use crate::source::Cancellation;
use crate::source::ScanDirection;
use crate::source::SourceKind;
use crate::source::TokenSource;
use crate::token::adler32;
use crate::unified;

/// Files are read in chunks of 128 KiB. There is no particular science to
/// this number.
const CHUNK_SHIFT: u32 = 17;
const CHUNK_SIZE: usize = 1 << CHUNK_SHIFT;

/// Chunk size for byte-for-byte comparison re-reads and backward scans.
const COMPARE_CHUNK_SIZE: usize = 4096;

fn chunk_to_offset(chunk: usize) -> u64 {
    (chunk as u64) << CHUNK_SHIFT
}

fn offset_to_chunk(offset: u64) -> usize {
    (offset >> CHUNK_SHIFT) as usize
}

fn offset_in_chunk(offset: u64) -> usize {
    (offset & (CHUNK_SIZE as u64 - 1)) as usize
}

fn find_eol_start(buf: &[u8]) -> Option<usize> {
    buf.iter().position(|&byte| byte == b'\n' || byte == b'\r')
}

/// How much whitespace to ignore when comparing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IgnoreSpace {
    /// Whitespace is compared verbatim.
    #[default]
    None,
    /// Runs of whitespace compare equal to a single space.
    Change,
    /// All whitespace is ignored.
    All,
}

/// Comparison and rendering options for file diffs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffFileOptions {
    /// Whitespace handling.
    pub ignore_space: IgnoreSpace,
    /// Whether `\n`, `\r` and `\r\n` are treated alike.
    pub ignore_eol_style: bool,
    /// Context radius for unified-diff output.
    pub context_size: usize,
}

impl Default for DiffFileOptions {
    fn default() -> Self {
        Self {
            ignore_space: IgnoreSpace::None,
            ignore_eol_style: false,
            context_size: unified::DEFAULT_CONTEXT_SIZE,
        }
    }
}

impl DiffFileOptions {
    /// Applies a diff-option argument list to these options.
    ///
    /// Accepts `-b`/`--ignore-space-change`, `-w`/`--ignore-all-space`
    /// (which overrides `-b` regardless of order), `--ignore-eol-style`,
    /// and `-u`/`--unified` (a no-op since unified is the only supported
    /// format). Anything else fails with [`DiffError::InvalidOption`].
    pub fn parse_args<I>(&mut self, args: I) -> DiffResult<()>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        for arg in args {
            match arg.as_ref() {
                "-b" | "--ignore-space-change" => {
                    // -w takes precedence over -b.
                    if self.ignore_space == IgnoreSpace::None {
                        self.ignore_space = IgnoreSpace::Change;
                    }
                }
                "-w" | "--ignore-all-space" => self.ignore_space = IgnoreSpace::All,
                "--ignore-eol-style" => self.ignore_eol_style = true,
                "-u" | "--unified" => {}
                other => return Err(DiffError::InvalidOption(other.to_owned())),
            }
        }
        Ok(())
    }
}

/// A line of a file: where its bytes live and how long they are, before
/// and after normalization.
#[derive(Clone, Copy, Debug)]
pub struct FileToken {
    kind: SourceKind,
    offset: u64,
    raw_length: u64,
    length: u64,
}

struct FileStream {
    path: PathBuf,
    file: Option<File>,
    size: u64,
    chunk: usize,
    buffer: Vec<u8>,
    curp: usize,
    normalize_state: NormalizeState,
    /// Exclusive end for forward reads; the trimmed suffix lies beyond it.
    suffix_limit: u64,
    /// Backward scan position.
    suffix_cursor: u64,
}

impl FileStream {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_owned(),
            file: None,
            size: 0,
            chunk: 0,
            buffer: vec![],
            curp: 0,
            normalize_state: NormalizeState::default(),
            suffix_limit: 0,
            suffix_cursor: 0,
        }
    }

    fn ensure_open(&mut self) -> DiffResult<()> {
        if self.file.is_none() {
            let file = File::open(&self.path)?;
            self.size = file.metadata()?.len();
            self.suffix_cursor = self.size;
            self.file = Some(file);
        }
        Ok(())
    }

    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> DiffResult<()> {
        let file = self.file.as_mut().expect("datasource was not opened");
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// Loads the chunk containing `offset` and places the cursor on it.
    fn load_chunk_at(&mut self, offset: u64) -> DiffResult<()> {
        let chunk = offset_to_chunk(offset);
        if chunk != self.chunk || self.buffer.is_empty() {
            let len = if chunk == offset_to_chunk(self.suffix_limit) {
                offset_in_chunk(self.suffix_limit)
            } else {
                CHUNK_SIZE
            };
            self.chunk = chunk;
            self.buffer.resize(len, 0);
            if len > 0 {
                self.read_at_chunk(chunk)?;
            }
        }
        self.curp = offset_in_chunk(offset);
        Ok(())
    }

    fn read_at_chunk(&mut self, chunk: usize) -> DiffResult<()> {
        let offset = chunk_to_offset(chunk);
        let file = self.file.as_mut().expect("datasource was not opened");
        file.seek(SeekFrom::Start(offset))?;
        let len = self.buffer.len();
        file.read_exact(&mut self.buffer[..len])?;
        Ok(())
    }
}

/// [`TokenSource`] over up to four files.
pub struct FileSource {
    streams: [Option<FileStream>; 4],
    options: DiffFileOptions,
}

impl FileSource {
    /// Source for a two-way diff.
    pub fn two(original: &Path, modified: &Path, options: DiffFileOptions) -> Self {
        Self {
            streams: [
                Some(FileStream::new(original)),
                Some(FileStream::new(modified)),
                None,
                None,
            ],
            options,
        }
    }

    /// Source for a three-way diff.
    pub fn three(
        original: &Path,
        modified: &Path,
        latest: &Path,
        options: DiffFileOptions,
    ) -> Self {
        Self {
            streams: [
                Some(FileStream::new(original)),
                Some(FileStream::new(modified)),
                Some(FileStream::new(latest)),
                None,
            ],
            options,
        }
    }

    /// Source for a four-way diff.
    pub fn four(
        original: &Path,
        modified: &Path,
        latest: &Path,
        ancestor: &Path,
        options: DiffFileOptions,
    ) -> Self {
        Self {
            streams: [
                Some(FileStream::new(original)),
                Some(FileStream::new(modified)),
                Some(FileStream::new(latest)),
                Some(FileStream::new(ancestor)),
            ],
            options,
        }
    }

    fn stream(&mut self, kind: SourceKind) -> &mut FileStream {
        self.streams[kind.index()]
            .as_mut()
            .expect("datasource was not provided")
    }
}

impl TokenSource for FileSource {
    type Token = FileToken;

    fn open(&mut self, kind: SourceKind, direction: ScanDirection) -> DiffResult<()> {
        let stream = self.stream(kind);
        stream.ensure_open()?;
        match direction {
            ScanDirection::Backward => stream.suffix_cursor = stream.size,
            ScanDirection::Forward => {
                // A backward scan may have lowered the cursor; whatever is
                // left of it is the forward-visible region.
                stream.suffix_limit = stream.suffix_cursor;
                stream.chunk = 0;
                stream.curp = 0;
                stream.normalize_state = NormalizeState::default();
                let len = stream.suffix_limit.min(CHUNK_SIZE as u64) as usize;
                stream.buffer.resize(len, 0);
                if len > 0 {
                    stream.read_at_chunk(0)?;
                }
            }
        }
        Ok(())
    }

    fn close(&mut self, _kind: SourceKind) -> DiffResult<()> {
        // Token comparison re-reads earlier datasources until the whole
        // diff is done, so nothing is released here.
        Ok(())
    }

    fn next_token(&mut self, kind: SourceKind) -> DiffResult<Option<(u32, Self::Token)>> {
        let Self { streams, options } = self;
        let stream = streams[kind.index()]
            .as_mut()
            .expect("datasource was not provided");
        let limit = stream.suffix_limit;
        let last_chunk = offset_to_chunk(limit);

        if stream.curp == stream.buffer.len() && stream.chunk == last_chunk {
            return Ok(None);
        }

        let mut token = FileToken {
            kind,
            offset: chunk_to_offset(stream.chunk) + stream.curp as u64,
            raw_length: 0,
            length: 0,
        };
        let mut hash = 0;
        let eol = loop {
            if let Some(found) = find_eol_start(&stream.buffer[stream.curp..]) {
                let mut eol = stream.curp + found;
                let had_cr = stream.buffer[eol] == b'\r';
                eol += 1;
                // Only stop here if the whole EOL sequence is in the chunk.
                if !had_cr || eol != stream.buffer.len() {
                    if had_cr && stream.buffer[eol] == b'\n' {
                        eol += 1;
                    }
                    break eol;
                }
            }
            let had_cr = stream.buffer.last() == Some(&b'\r');

            if stream.chunk == last_chunk {
                break stream.buffer.len();
            }

            // The token continues into the next chunk; fold in what we have.
            let raw = stream.buffer.len() - stream.curp;
            token.raw_length += raw as u64;
            let normalized = normalize_buffer(
                &mut stream.buffer[stream.curp..],
                &mut stream.normalize_state,
                options,
            );
            token.length += normalized as u64;
            hash = adler32(hash, &stream.buffer[stream.curp..stream.curp + normalized]);

            stream.chunk += 1;
            let len = if stream.chunk == last_chunk {
                offset_in_chunk(limit)
            } else {
                CHUNK_SIZE
            };
            stream.buffer.resize(len, 0);
            stream.curp = 0;
            if len > 0 {
                stream.read_at_chunk(stream.chunk)?;
            }

            // If the previous chunk ended in a CR, the token ends here; an
            // LF at the start of this chunk still belongs to it.
            if had_cr {
                break usize::from(len > 0 && stream.buffer[0] == b'\n');
            }
        };

        let raw = eol - stream.curp;
        token.raw_length += raw as u64;
        // A file sized an exact multiple of the chunk size would otherwise
        // yield a spurious empty token here. The check is on the raw length:
        // a line of pure ignored whitespace must not look non-existent.
        if token.raw_length == 0 {
            stream.curp = eol;
            return Ok(None);
        }
        let normalized = normalize_buffer(
            &mut stream.buffer[stream.curp..eol],
            &mut stream.normalize_state,
            options,
        );
        token.length += normalized as u64;
        hash = adler32(hash, &stream.buffer[stream.curp..stream.curp + normalized]);
        stream.curp = eol;
        Ok(Some((hash, token)))
    }

    fn previous_token(&mut self, kind: SourceKind) -> DiffResult<Option<Self::Token>> {
        let stream = self.stream(kind);
        let end = stream.suffix_cursor;
        if end == 0 {
            return Ok(None);
        }

        // Load a window ending at the cursor and grow it until it contains
        // the whole last line.
        let mut window_len = (COMPARE_CHUNK_SIZE as u64).min(end);
        let start = loop {
            let window_start = end - window_len;
            let mut window = vec![0; window_len as usize];
            stream.read_at(&mut window, window_start)?;

            // Skip the token's own terminator, then look for the one that
            // precedes it.
            let mut content = window.len();
            match window[content - 1] {
                b'\n' => {
                    content -= 1;
                    if content > 0 && window[content - 1] == b'\r' {
                        content -= 1;
                    }
                }
                b'\r' => content -= 1,
                _ => {}
            }
            match window[..content]
                .iter()
                .rposition(|&byte| byte == b'\n' || byte == b'\r')
            {
                Some(found) => break window_start + found as u64 + 1,
                None if window_start == 0 => break 0,
                None => window_len = (window_len * 2).min(end),
            }
        };

        let raw_length = end - start;
        stream.suffix_cursor = start;
        // The suffix scan only runs for verbatim comparisons, so the
        // normalized length equals the raw length.
        Ok(Some(FileToken {
            kind,
            offset: start,
            raw_length,
            length: raw_length,
        }))
    }

    fn push_back_prefix(&mut self, kind: SourceKind, token: Self::Token) -> DiffResult<()> {
        let stream = self.stream(kind);
        stream.load_chunk_at(token.offset)
    }

    fn push_back_suffix(&mut self, kind: SourceKind, token: Self::Token) -> DiffResult<()> {
        let stream = self.stream(kind);
        stream.suffix_cursor = token.offset + token.raw_length;
        Ok(())
    }

    fn compare(&mut self, a: &Self::Token, b: &Self::Token) -> DiffResult<Ordering> {
        if a.length != b.length {
            return Ok(a.length.cmp(&b.length));
        }
        let mut total = a.length as usize;
        if total == 0 {
            return Ok(Ordering::Equal);
        }

        let Self { streams, options } = self;
        let tokens = [a, b];
        let mut scratch = [[0; COMPARE_CHUNK_SIZE]; 2];
        let mut sides = [CompareSide::default(), CompareSide::default()];
        for (side, token) in sides.iter_mut().zip(tokens) {
            side.source_index = token.kind.index();
            let stream = streams[side.source_index]
                .as_ref()
                .expect("datasource was not provided");
            if offset_to_chunk(token.offset) == stream.chunk {
                // The token starts in the resident chunk, so the whole
                // normalized token is in memory.
                side.in_memory = Some(offset_in_chunk(token.offset));
                side.window_len = total;
            } else {
                side.offset = token.offset;
                side.raw_remaining = token.raw_length;
            }
        }

        loop {
            for (index, side) in sides.iter_mut().enumerate() {
                if side.consumed < side.window_len || side.in_memory.is_some() {
                    continue;
                }
                // Refill from disk, normalizing as the original read did.
                if side.raw_remaining == 0 {
                    let stream = streams[side.source_index]
                        .as_ref()
                        .expect("datasource was not provided");
                    return Err(DiffError::DatasourceModified {
                        path: stream.path.clone(),
                    });
                }
                let len = (side.raw_remaining as usize).min(COMPARE_CHUNK_SIZE);
                let stream = streams[side.source_index]
                    .as_mut()
                    .expect("datasource was not provided");
                stream.read_at(&mut scratch[index][..len], side.offset)?;
                side.offset += len as u64;
                side.raw_remaining -= len as u64;
                side.window_len =
                    normalize_buffer(&mut scratch[index][..len], &mut side.state, options);
                side.consumed = 0;
            }

            let len = (sides[0].window_len - sides[0].consumed)
                .min(sides[1].window_len - sides[1].consumed);
            let slice0 = match sides[0].in_memory {
                Some(start) => {
                    let stream = streams[sides[0].source_index]
                        .as_ref()
                        .expect("datasource was not provided");
                    &stream.buffer[start + sides[0].consumed..start + sides[0].consumed + len]
                }
                None => &scratch[0][sides[0].consumed..sides[0].consumed + len],
            };
            let slice1 = match sides[1].in_memory {
                Some(start) => {
                    let stream = streams[sides[1].source_index]
                        .as_ref()
                        .expect("datasource was not provided");
                    &stream.buffer[start + sides[1].consumed..start + sides[1].consumed + len]
                }
                None => &scratch[1][sides[1].consumed..sides[1].consumed + len],
            };
            match slice0.cmp(slice1) {
                Ordering::Equal => {}
                unequal => return Ok(unequal),
            }

            total -= len;
            if total == 0 {
                return Ok(Ordering::Equal);
            }
            sides[0].consumed += len;
            sides[1].consumed += len;
        }
    }

    fn supports_trim(&self) -> bool {
        self.options.ignore_space == IgnoreSpace::None && !self.options.ignore_eol_style
    }
}

#[derive(Default)]
struct CompareSide {
    source_index: usize,
    in_memory: Option<usize>,
    window_len: usize,
    consumed: usize,
    offset: u64,
    raw_remaining: u64,
    state: NormalizeState,
}

/// Computes the difference between two files.
pub fn diff(
    original: &Path,
    modified: &Path,
    options: &DiffFileOptions,
    cancel: Cancellation,
) -> DiffResult<Diff> {
    let mut source = FileSource::two(original, modified, options.clone());
    Diff::two_way(&mut source, cancel)
}

/// Computes the three-way difference between files.
pub fn diff3(
    original: &Path,
    modified: &Path,
    latest: &Path,
    options: &DiffFileOptions,
    cancel: Cancellation,
) -> DiffResult<Diff> {
    let mut source = FileSource::three(original, modified, latest, options.clone());
    Diff::three_way(&mut source, cancel)
}

/// Computes the four-way difference between files.
pub fn diff4(
    original: &Path,
    modified: &Path,
    latest: &Path,
    ancestor: &Path,
    options: &DiffFileOptions,
    cancel: Cancellation,
) -> DiffResult<Diff> {
    let mut source = FileSource::four(original, modified, latest, ancestor, options.clone());
    Diff::four_way(&mut source, cancel)
}

/// Writes `diff` between two files as a unified diff.
///
/// A missing header defaults to `path<TAB>mtime` with the modification time
/// formatted in a fixed, locale-independent pattern.
pub fn write_unified(
    out: &mut dyn Write,
    diff: &Diff,
    original_path: &Path,
    modified_path: &Path,
    original_header: Option<&str>,
    modified_header: Option<&str>,
    options: &DiffFileOptions,
) -> DiffResult<()> {
    if !diff.contains_diffs() {
        return Ok(());
    }
    let original = fs::read(original_path)?;
    let modified = fs::read(modified_path)?;
    let original_header = match original_header {
        Some(header) => header.to_owned(),
        None => default_header(original_path)?,
    };
    let modified_header = match modified_header {
        Some(header) => header.to_owned(),
        None => default_header(modified_path)?,
    };
    unified::write(
        out,
        diff,
        &original,
        &modified,
        &original_header,
        &modified_header,
        options.context_size,
    )
}

/// Writes a three- or four-way `diff` between files as a merged file with
/// conflict markers. Marker labels default to the file paths.
pub fn write_merge(
    out: &mut dyn Write,
    diff: &Diff,
    original_path: &Path,
    modified_path: &Path,
    latest_path: &Path,
    options: &MergeOptions,
) -> DiffResult<()> {
    let original = fs::read(original_path)?;
    let modified = fs::read(modified_path)?;
    let latest = fs::read(latest_path)?;
    let mut options = options.clone();
    let path_label = |path: &Path| path.display().to_string();
    options
        .original_label
        .get_or_insert_with(|| path_label(original_path));
    options
        .modified_label
        .get_or_insert_with(|| path_label(modified_path));
    options
        .latest_label
        .get_or_insert_with(|| path_label(latest_path));
    merge::write(out, diff, &original, &modified, &latest, &options)
}

/// `path<TAB>mtime`, e.g. `foo.c\tTue Mar  5 09:30:42 2024`.
fn default_header(path: &Path) -> DiffResult<String> {
    let mtime = fs::metadata(path)?.modified()?;
    let mtime: DateTime<Local> = mtime.into();
    let timestamp = mtime.format("%a %b %e %H:%M:%S %Y");
    Ok(format!("{}\t{timestamp}", path.display()))
}
