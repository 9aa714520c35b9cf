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

//! Token interning and position-ring construction.
//!
//! Every token read from a datasource is interned into a shared index that
//! collapses equal tokens to one node. After interning, the engine never
//! compares tokens by value again; node identity is all that matters.

use std::cmp::Ordering;

use crate::diff::DiffResult;
use crate::source::ScanDirection;
use crate::source::SourceKind;
use crate::source::TokenSource;

/// Number of hash buckets in the token index. A small prime; performance
/// relies on hash dispersion, not on tree balance.
const HASH_BUCKETS: usize = 127;

/// Largest prime less than 65536, per RFC 1950.
const ADLER_MOD_BASE: u32 = 65521;

/// The modulo on 32-bit accumulators can be delayed for 5552 bytes.
const ADLER_MOD_BLOCK_SIZE: usize = 5552;

/// Adler-32, updating `checksum` with `data`.
///
/// Used as the advisory token hash by the built-in providers. Adler-32 is
/// much faster than CRC-32 and disperses well enough for bucketing.
pub fn adler32(checksum: u32, data: &[u8]) -> u32 {
    let mut s1 = checksum & 0xffff;
    let mut s2 = checksum >> 16;
    for block in data.chunks(ADLER_MOD_BLOCK_SIZE) {
        for &byte in block {
            s1 += u32::from(byte);
            s2 += s1;
        }
        s1 %= ADLER_MOD_BASE;
        s2 %= ADLER_MOD_BASE;
    }
    (s2 << 16) | s1
}

struct IndexNode<T> {
    left: Option<usize>,
    right: Option<usize>,
    hash: u32,
    token: T,
}

/// Hash-bucketed binary search tree mapping tokens to stable node ids.
pub(crate) struct TokenIndex<T> {
    buckets: Vec<Option<usize>>,
    nodes: Vec<IndexNode<T>>,
}

impl<T> TokenIndex<T> {
    pub fn new() -> Self {
        Self {
            buckets: vec![None; HASH_BUCKETS],
            nodes: vec![],
        }
    }

    /// Interns `token`, returning the node id shared by all equal tokens.
    pub fn insert<S>(&mut self, source: &mut S, hash: u32, token: T) -> DiffResult<usize>
    where
        S: TokenSource<Token = T>,
    {
        let mut slot = Slot::Bucket(hash as usize % HASH_BUCKETS);
        loop {
            let occupant = match slot {
                Slot::Bucket(bucket) => self.buckets[bucket],
                Slot::Left(node) => self.nodes[node].left,
                Slot::Right(node) => self.nodes[node].right,
            };
            let Some(node) = occupant else {
                break;
            };
            let step = match self.nodes[node].hash.cmp(&hash) {
                Ordering::Equal => source.compare(&self.nodes[node].token, &token)?,
                unequal => unequal.reverse(),
            };
            match step {
                Ordering::Equal => {
                    // Keep the newer token; recently read tokens tend to be
                    // the cheapest ones for the provider to re-read.
                    let old = std::mem::replace(&mut self.nodes[node].token, token);
                    source.discard(old);
                    return Ok(node);
                }
                Ordering::Greater => slot = Slot::Left(node),
                Ordering::Less => slot = Slot::Right(node),
            }
        }

        let new_node = self.nodes.len();
        self.nodes.push(IndexNode {
            left: None,
            right: None,
            hash,
            token,
        });
        match slot {
            Slot::Bucket(bucket) => self.buckets[bucket] = Some(new_node),
            Slot::Left(node) => self.nodes[node].left = Some(new_node),
            Slot::Right(node) => self.nodes[node].right = Some(new_node),
        }
        Ok(new_node)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.nodes.len()
    }
}

enum Slot {
    Bucket(usize),
    Left(usize),
    Right(usize),
}

/// One entry of a position ring: a node at a 1-based offset in one source.
///
/// Positions for one source form a cyclic list threaded through `next`. The
/// handle kept for a ring is its tail, so `tail.next` is the head and a full
/// traversal walks `next` until the tail comes around again.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PositionRec {
    pub next: usize,
    pub node: usize,
    pub offset: usize,
}

/// Position rings for all requested sources, sharing one arena.
pub(crate) struct Rings {
    pub positions: Vec<PositionRec>,
    /// Tail position per requested source; `None` for an empty source.
    pub tails: Vec<Option<usize>>,
    /// Tokens consumed as an implicit common prefix of all sources.
    pub prefix_lines: usize,
    /// Tokens consumed as an implicit common suffix of all sources.
    pub suffix_lines: usize,
}

/// Reads every token of every requested source, interning as it goes.
///
/// When the provider supports it, identical leading and trailing runs across
/// all sources are consumed up front and only counted; offsets of the
/// remaining positions start after the prefix so they stay globally correct.
pub(crate) fn build_rings<S: TokenSource>(
    source: &mut S,
    kinds: &[SourceKind],
) -> DiffResult<Rings> {
    let mut rings = Rings {
        positions: vec![],
        tails: vec![None; kinds.len()],
        prefix_lines: 0,
        suffix_lines: 0,
    };

    if source.supports_trim() {
        for &kind in kinds {
            source.open(kind, ScanDirection::Backward)?;
        }
        rings.suffix_lines = find_identical_suffix(source, kinds)?;
        for &kind in kinds {
            source.open(kind, ScanDirection::Forward)?;
        }
        rings.prefix_lines = find_identical_prefix(source, kinds)?;
    } else {
        for &kind in kinds {
            source.open(kind, ScanDirection::Forward)?;
        }
    }

    let mut index = TokenIndex::new();
    for (ring, &kind) in kinds.iter().enumerate() {
        let mut offset = rings.prefix_lines;
        let mut head = None;
        let mut tail: Option<usize> = None;
        while let Some((hash, token)) = source.next_token(kind)? {
            offset += 1;
            let node = index.insert(source, hash, token)?;
            let position = rings.positions.len();
            rings.positions.push(PositionRec {
                next: position,
                node,
                offset,
            });
            match tail {
                Some(tail) => rings.positions[tail].next = position,
                None => head = Some(position),
            }
            tail = Some(position);
        }
        if let (Some(head), Some(tail)) = (head, tail) {
            rings.positions[tail].next = head;
        }
        rings.tails[ring] = tail;
        source.close(kind)?;
    }

    tracing::trace!(
        positions = rings.positions.len(),
        prefix = rings.prefix_lines,
        suffix = rings.suffix_lines,
        "built position rings"
    );
    source.discard_all();
    Ok(rings)
}

/// Consumes the identical trailing run shared by all sources, returning its
/// length in tokens. The first token that breaks the run is pushed back on
/// every source that produced one.
fn find_identical_suffix<S: TokenSource>(
    source: &mut S,
    kinds: &[SourceKind],
) -> DiffResult<usize> {
    let mut suffix_lines = 0;
    let mut tokens: Vec<Option<S::Token>> = kinds.iter().map(|_| None).collect();
    loop {
        let mut reached_one_bof = false;
        for (token, &kind) in tokens.iter_mut().zip(kinds) {
            *token = source.previous_token(kind)?;
            reached_one_bof |= token.is_none();
        }
        if reached_one_bof {
            break;
        }
        let mut is_match = true;
        for i in 1..tokens.len() {
            let a = tokens[0].as_ref().expect("token checked above");
            let b = tokens[i].as_ref().expect("token checked above");
            is_match = is_match && source.compare(a, b)? == Ordering::Equal;
        }
        if !is_match {
            break;
        }
        suffix_lines += 1;
        for token in &mut tokens {
            if let Some(token) = token.take() {
                source.discard(token);
            }
        }
    }

    // Fully identical sources leave nothing to push back.
    if tokens.iter().all(Option::is_none) {
        return Ok(suffix_lines);
    }
    for (token, &kind) in tokens.iter_mut().zip(kinds) {
        if let Some(token) = token.take() {
            source.push_back_suffix(kind, token)?;
        }
    }
    Ok(suffix_lines)
}

/// Consumes the identical leading run shared by all sources, returning its
/// length in tokens. The first token that breaks the run is pushed back on
/// every source that produced one.
fn find_identical_prefix<S: TokenSource>(
    source: &mut S,
    kinds: &[SourceKind],
) -> DiffResult<usize> {
    let mut prefix_lines = 0;
    let mut tokens: Vec<Option<S::Token>> = kinds.iter().map(|_| None).collect();
    loop {
        let mut reached_one_eof = false;
        for (token, &kind) in tokens.iter_mut().zip(kinds) {
            *token = source.next_token(kind)?.map(|(_, token)| token);
            reached_one_eof |= token.is_none();
        }
        if reached_one_eof {
            break;
        }
        let mut is_match = true;
        for i in 1..tokens.len() {
            let a = tokens[0].as_ref().expect("token checked above");
            let b = tokens[i].as_ref().expect("token checked above");
            is_match = is_match && source.compare(a, b)? == Ordering::Equal;
        }
        if !is_match {
            break;
        }
        prefix_lines += 1;
        for token in &mut tokens {
            if let Some(token) = token.take() {
                source.discard(token);
            }
        }
    }

    if tokens.iter().all(Option::is_none) {
        return Ok(prefix_lines);
    }
    for (token, &kind) in tokens.iter_mut().zip(kinds) {
        if let Some(token) = token.take() {
            source.push_back_prefix(kind, token)?;
        }
    }
    Ok(prefix_lines)
}
