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

//! In-place whitespace and line-ending canonicalization.
//!
//! Comparison options may ask for runs of whitespace to be collapsed or
//! dropped, and for `\r`, `\n` and `\r\n` to be treated alike. The
//! normalizer rewrites a buffer in place under those options. Its state
//! survives across calls so a token or file may be fed in arbitrary chunks
//! without affecting the result.

use crate::file::DiffFileOptions;
use crate::file::IgnoreSpace;

/// Cross-chunk normalization state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum NormalizeState {
    /// Not in a whitespace sequence.
    #[default]
    Normal,
    /// In a whitespace sequence. Only entered when whitespace is ignored.
    Whitespace,
    /// The previous byte was CR.
    Cr,
}

fn is_space(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\x0b' | b'\x0c' | b'\r')
}

/// Normalizes `buf` in place according to `options`, starting in `*state`.
/// Returns the normalized length; the bytes beyond it are garbage. `*state`
/// is left ready for the bytes that follow the buffer.
pub(crate) fn normalize_buffer(
    buf: &mut [u8],
    state: &mut NormalizeState,
    options: &DiffFileOptions,
) -> usize {
    if options.ignore_space == IgnoreSpace::None && !options.ignore_eol_style {
        return buf.len();
    }

    // `start` is the beginning of the next pending chunk to copy, `new_end`
    // the end of the normalized output so far.
    let mut start = 0;
    let mut new_end = 0;
    let mut current = *state;

    for index in 0..buf.len() {
        let byte = buf[index];
        if current == NormalizeState::Cr {
            current = NormalizeState::Normal;
            if byte == b'\n' && options.ignore_eol_style {
                // The LF of a CRLF; the CR already became an LF.
                start = index + 1;
                continue;
            }
        }
        match current {
            NormalizeState::Normal => {
                if is_space(byte) {
                    // Flush pending non-whitespace bytes.
                    buf.copy_within(start..index, new_end);
                    new_end += index - start;
                    start = index;
                    match byte {
                        b'\r' => {
                            current = NormalizeState::Cr;
                            if options.ignore_eol_style {
                                buf[new_end] = b'\n';
                                new_end += 1;
                                start += 1;
                            }
                        }
                        b'\n' => {}
                        _ => {
                            if options.ignore_space != IgnoreSpace::None {
                                current = NormalizeState::Whitespace;
                                if options.ignore_space == IgnoreSpace::Change {
                                    buf[new_end] = b' ';
                                    new_end += 1;
                                }
                            }
                        }
                    }
                }
            }
            NormalizeState::Whitespace => {
                if is_space(byte) {
                    match byte {
                        b'\r' => {
                            current = NormalizeState::Cr;
                            if options.ignore_eol_style {
                                buf[new_end] = b'\n';
                                new_end += 1;
                                start = index + 1;
                            } else {
                                start = index;
                            }
                        }
                        b'\n' => {
                            current = NormalizeState::Normal;
                            start = index;
                        }
                        _ => {}
                    }
                } else {
                    start = index;
                    current = NormalizeState::Normal;
                }
            }
            NormalizeState::Cr => unreachable!("handled before the match"),
        }
    }

    // Flush the pending tail unless it is ignorable whitespace. A pending
    // EOL was either emitted on entering the CR state or is flushed here.
    if current != NormalizeState::Whitespace {
        buf.copy_within(start..buf.len(), new_end);
        new_end += buf.len() - start;
    }
    *state = current;
    new_end
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    fn normalize_all(input: &[u8], options: &DiffFileOptions) -> Vec<u8> {
        let mut buf = input.to_vec();
        let mut state = NormalizeState::default();
        let len = normalize_buffer(&mut buf, &mut state, options);
        buf.truncate(len);
        buf
    }

    fn normalize_split(input: &[u8], at: usize, options: &DiffFileOptions) -> Vec<u8> {
        let mut state = NormalizeState::default();
        let mut out = vec![];
        for chunk in [&input[..at], &input[at..]] {
            let mut buf = chunk.to_vec();
            let len = normalize_buffer(&mut buf, &mut state, options);
            out.extend_from_slice(&buf[..len]);
        }
        out
    }

    fn options(ignore_space: IgnoreSpace, ignore_eol_style: bool) -> DiffFileOptions {
        DiffFileOptions {
            ignore_space,
            ignore_eol_style,
            ..DiffFileOptions::default()
        }
    }

    #[test]
    fn test_normalize_verbatim_is_identity() {
        let options = options(IgnoreSpace::None, false);
        assert_eq!(normalize_all(b"a \t b\r\n", &options), b"a \t b\r\n");
    }

    #[test]
    fn test_normalize_space_change_collapses_runs() {
        let options = options(IgnoreSpace::Change, false);
        assert_eq!(normalize_all(b"a  \t  b\n", &options), b"a b\n");
        assert_eq!(normalize_all(b"  a\n", &options), b" a\n");
        // Trailing whitespace before the newline collapses into the EOL.
        assert_eq!(normalize_all(b"a   \n", &options), b"a \n");
    }

    #[test]
    fn test_normalize_space_all_strips_whitespace() {
        let options = options(IgnoreSpace::All, false);
        assert_eq!(normalize_all(b"a \t b c\n", &options), b"abc\n");
        // A line of nothing but spaces keeps its newline.
        assert_eq!(normalize_all(b"   \n", &options), b"\n");
    }

    #[test]
    fn test_normalize_eol_styles_converge() {
        let options = options(IgnoreSpace::None, true);
        assert_eq!(normalize_all(b"a\r\nb\rc\n", &options), b"a\nb\nc\n");
    }

    #[test]
    fn test_normalize_trailing_whitespace_without_newline_is_dropped() {
        let options = options(IgnoreSpace::All, false);
        assert_eq!(normalize_all(b"a   ", &options), b"a");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for ignore_space in [IgnoreSpace::None, IgnoreSpace::Change, IgnoreSpace::All] {
            for ignore_eol_style in [false, true] {
                let options = options(ignore_space, ignore_eol_style);
                let input = b"a  b\t\r\nnext  \r line\r\n\n mixed\r";
                let once = normalize_all(input, &options);
                let twice = normalize_all(&once, &options);
                assert_eq!(twice, once, "{options:?}");
            }
        }
    }

    // The choice of chunk boundary must not affect the result, in
    // particular when it falls inside a CRLF pair or a whitespace run.
    #[test_case(b"a\r\nb\r\nc\r\n"; "crlf pairs")]
    #[test_case(b"a   b   c\n"; "space runs")]
    #[test_case(b"x\r\r\n  \ty\r"; "mixed")]
    fn test_normalize_chunking_independence(input: &[u8]) {
        for ignore_space in [IgnoreSpace::None, IgnoreSpace::Change, IgnoreSpace::All] {
            for ignore_eol_style in [false, true] {
                let options = options(ignore_space, ignore_eol_style);
                let whole = normalize_all(input, &options);
                for at in 0..=input.len() {
                    assert_eq!(
                        normalize_split(input, at, &options),
                        whole,
                        "split at {at} with {options:?}"
                    );
                }
            }
        }
    }
}
