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

//! Contextual diffing and three-way merging over token streams.
//!
//! The engine is token-generic: any source that can stream a linear
//! sequence of opaque tokens with an equality relation can be diffed by
//! implementing [`source::TokenSource`]. Built-in providers cover files
//! ([`file`]) and in-memory buffers ([`memory`]); for both, tokens are
//! lines. On top of the raw diff ([`diff::Diff`]), the [`unified`] module
//! renders unified-context output and the [`merge`] module renders merged
//! files with conflict markers.
//!
//! ```
//! use braid_lib::memory;
//! use braid_lib::source::Cancellation;
//!
//! let diff = memory::diff(b"a\nb\n", b"a\nc\n", Cancellation::NONE)?;
//! assert!(diff.contains_diffs());
//! # Ok::<(), braid_lib::diff::DiffError>(())
//! ```

#![warn(missing_docs)]

pub mod diff;
mod diff3;
mod diff4;
pub mod file;
mod lcs;
pub mod memory;
pub mod merge;
mod normalize;
pub mod source;
mod token;
pub mod unified;

pub use token::adler32;
