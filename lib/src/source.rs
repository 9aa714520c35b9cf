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

//! The contract between the diff engine and its data sources.
//!
//! The engine is token-generic: it never looks inside a token. A
//! [`TokenSource`] streams tokens (typically lines) for up to four
//! datasources and answers equality queries about them; everything else is
//! the engine's business.

use std::cmp::Ordering;

use crate::diff::DiffError;
use crate::diff::DiffResult;

/// Identifies one of the datasources participating in a diff.
///
/// In GNU diff3 terminology, the first three correspond to "older", "mine"
/// and "yours".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// The oldest form of the data.
    Original,
    /// The same data, but potentially changed by the user.
    Modified,
    /// The latest version of the data, possibly different from the user's
    /// modified version.
    Latest,
    /// A common ancestor of `Modified` and `Latest`, used only by four-way
    /// merges.
    Ancestor,
}

impl SourceKind {
    pub(crate) fn index(self) -> usize {
        match self {
            Self::Original => 0,
            Self::Modified => 1,
            Self::Latest => 2,
            Self::Ancestor => 3,
        }
    }
}

/// The direction a datasource is opened for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanDirection {
    /// Normal front-to-back token streaming.
    Forward,
    /// Back-to-front streaming, used only for the identical-suffix scan.
    Backward,
}

/// A source of tokens for the diff engine.
///
/// The engine opens each datasource, drains it once front to back, and
/// closes it. A datasource may be opened more than once; a second open
/// restarts streaming from the beginning. `close` must tolerate being called
/// while other datasources remain open, because token comparison may re-read
/// earlier sources until the whole diff is done.
///
/// When [`supports_trim`](Self::supports_trim) returns true, the engine may
/// additionally open sources with [`ScanDirection::Backward`] and consume
/// matching tokens from both ends before building its index; the `previous_*`
/// and `push_back_*` methods are only called on such sources.
pub trait TokenSource {
    /// Opaque unit of comparison, typically one line.
    type Token;

    /// Begins (or restarts) streaming tokens from `kind`.
    fn open(&mut self, kind: SourceKind, direction: ScanDirection) -> DiffResult<()>;

    /// Releases per-stream state for `kind`.
    fn close(&mut self, kind: SourceKind) -> DiffResult<()>;

    /// Returns the next token and its advisory hash, or `None` at the end of
    /// the stream.
    ///
    /// The hash is used to bucket tokens in the engine's index; tokens that
    /// compare equal must produce equal hashes.
    fn next_token(&mut self, kind: SourceKind) -> DiffResult<Option<(u32, Self::Token)>>;

    /// Returns the token preceding the current backward-scan position, or
    /// `None` at the beginning of the stream.
    fn previous_token(&mut self, kind: SourceKind) -> DiffResult<Option<Self::Token>>;

    /// Re-queues a token read by [`next_token`](Self::next_token) so the next
    /// forward read returns it again.
    fn push_back_prefix(&mut self, kind: SourceKind, token: Self::Token) -> DiffResult<()>;

    /// Re-queues a token read by [`previous_token`](Self::previous_token) so
    /// that forward reads include it again.
    fn push_back_suffix(&mut self, kind: SourceKind, token: Self::Token) -> DiffResult<()>;

    /// Total order over tokens, consistent with the advisory hashes whenever
    /// two tokens hash equally. Only equality is meaningful to callers; the
    /// order exists so the engine can arrange tokens in a search tree.
    fn compare(&mut self, a: &Self::Token, b: &Self::Token) -> DiffResult<Ordering>;

    /// The engine no longer needs `token`.
    fn discard(&mut self, token: Self::Token) {
        let _ = token;
    }

    /// The engine no longer needs any token. Called once all position rings
    /// have been built.
    fn discard_all(&mut self) {}

    /// Whether the engine may run the identical prefix/suffix fast path over
    /// this source.
    fn supports_trim(&self) -> bool {
        false
    }
}

/// Cooperative cancellation for long-running diffs.
///
/// The engine polls the check between LCS sweeps and between segment
/// emissions. When the check returns true the engine stops promptly with
/// [`DiffError::Cancelled`], releasing its scratch state.
#[derive(Clone, Copy, Default)]
pub struct Cancellation<'a> {
    check: Option<&'a dyn Fn() -> bool>,
}

impl<'a> Cancellation<'a> {
    /// Never cancels.
    pub const NONE: Self = Self { check: None };

    /// Cancels as soon as `check` returns true.
    pub fn new(check: &'a dyn Fn() -> bool) -> Self {
        Self { check: Some(check) }
    }

    pub(crate) fn poll(&self) -> DiffResult<()> {
        match self.check {
            Some(check) if check() => Err(DiffError::Cancelled),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for Cancellation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cancellation")
            .field("check", &self.check.map(|_| "..."))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_cancellation_none_never_fires() {
        assert_matches!(Cancellation::NONE.poll(), Ok(()));
    }

    #[test]
    fn test_cancellation_fires_when_check_returns_true() {
        let calls = Cell::new(0);
        let check = || {
            calls.set(calls.get() + 1);
            calls.get() > 1
        };
        let cancel = Cancellation::new(&check);
        assert_matches!(cancel.poll(), Ok(()));
        assert_matches!(cancel.poll(), Err(DiffError::Cancelled));
    }
}
