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

//! Longest common subsequence over two position rings.
//!
//! Implements the O(NP) sequence comparison algorithm by Sun Wu, Udi Manber
//! and Gene Myers. The result is a linked list of matched runs in source
//! order, terminated by a zero-length element whose offsets are one past
//! each source's final offset; EOF is thereby a universal sync point for the
//! layers above.

use crate::diff::DiffResult;
use crate::source::Cancellation;
use crate::token::PositionRec;

/// Node id that matches nothing; used by synthetic positions.
pub(crate) const EOF_NODE: usize = usize::MAX;
const WALK_NODE_0: usize = usize::MAX - 1;
const WALK_NODE_1: usize = usize::MAX - 2;

/// A run of `length` matched positions, starting at `positions[0]` in the
/// first source and `positions[1]` in the second.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LcsRec {
    pub positions: [usize; 2],
    pub length: usize,
    pub next: Option<usize>,
}

/// Furthest point reached on one diagonal.
struct FurthestPoint {
    y: usize,
    lcs: Option<usize>,
    positions: [usize; 2],
}

/// Computes the LCS of the rings hanging off `tail0` and `tail1`, returning
/// the head of the run list in `lcs`.
///
/// `prefix_lines`/`suffix_lines` describe runs trimmed off all sources
/// before the rings were built; they are re-attached here as ordinary
/// matched runs so that the list always covers the full sources.
pub(crate) fn compute(
    positions: &mut Vec<PositionRec>,
    lcs: &mut Vec<LcsRec>,
    tail0: Option<usize>,
    tail1: Option<usize>,
    prefix_lines: usize,
    suffix_lines: usize,
    cancel: Cancellation,
) -> DiffResult<usize> {
    let end_offset0 = tail0.map_or(prefix_lines + 1, |tail| positions[tail].offset + 1);
    let end_offset1 = tail1.map_or(prefix_lines + 1, |tail| positions[tail].offset + 1);

    let mut chain = match (tail0, tail1) {
        (Some(tail0), Some(tail1)) => walk(positions, lcs, tail0, tail1, cancel)?,
        _ => None,
    };

    // EOF positions terminate every forward walk; they lead nowhere.
    let eof_pos0 = push_terminal(positions, end_offset0 + suffix_lines);
    let eof_pos1 = push_terminal(positions, end_offset1 + suffix_lines);

    if suffix_lines > 0 {
        let pos0 = push_linked(positions, end_offset0, eof_pos0);
        let pos1 = push_linked(positions, end_offset1, eof_pos1);
        let run = lcs.len();
        lcs.push(LcsRec {
            positions: [pos0, pos1],
            length: suffix_lines,
            next: chain,
        });
        chain = Some(run);
    }

    let eof = lcs.len();
    lcs.push(LcsRec {
        positions: [eof_pos0, eof_pos1],
        length: 0,
        next: chain,
    });

    // The chain was built newest-first; put it in source order with the EOF
    // element last.
    let mut head = reverse(lcs, eof);

    if prefix_lines > 0 {
        // Cursors parked on these positions must be able to walk on: into
        // the ring when there is one, to its end otherwise.
        let next0 = tail0.map_or(eof_pos0, |tail| positions[tail].next);
        let next1 = tail1.map_or(eof_pos1, |tail| positions[tail].next);
        let pos0 = push_linked(positions, 1, next0);
        let pos1 = push_linked(positions, 1, next1);
        let run = lcs.len();
        lcs.push(LcsRec {
            positions: [pos0, pos1],
            length: prefix_lines,
            next: Some(head),
        });
        head = run;
    }
    Ok(head)
}

/// Adds a position that exists only for its offset and leads to `next`.
fn push_linked(positions: &mut Vec<PositionRec>, offset: usize, next: usize) -> usize {
    let id = positions.len();
    positions.push(PositionRec {
        next,
        node: EOF_NODE,
        offset,
    });
    id
}

/// Adds a position that exists only for its offset and points at itself.
fn push_terminal(positions: &mut Vec<PositionRec>, offset: usize) -> usize {
    let id = positions.len();
    positions.push(PositionRec {
        next: id,
        node: EOF_NODE,
        offset,
    });
    id
}

fn reverse(lcs: &mut [LcsRec], start: usize) -> usize {
    let mut head = None;
    let mut current = Some(start);
    while let Some(id) = current {
        current = lcs[id].next;
        lcs[id].next = head;
        head = Some(id);
    }
    head.expect("reversed a non-empty list")
}

/// Runs the snake walk over two non-empty rings and returns the newest-first
/// chain of matched runs, if any.
fn walk(
    positions: &mut Vec<PositionRec>,
    lcs: &mut Vec<LcsRec>,
    tail0: usize,
    tail1: usize,
    cancel: Cancellation,
) -> DiffResult<Option<usize>> {
    let head0 = positions[tail0].next;
    let head1 = positions[tail1].next;
    let len0 = positions[tail0].offset - positions[head0].offset + 1;
    let len1 = positions[tail1].offset - positions[head1].offset + 1;

    // The walk wants its second sequence to be the longer one; `swapped`
    // remembers how to map walker order back to ring order.
    let swapped = len0 > len1;
    let delta = if swapped { len0 - len1 } else { len1 - len0 };

    // Splice a terminating sentinel after each tail. Walker 0 runs over the
    // first ring in walker order, walker 1 over the second; the walk is done
    // when walker 1 reaches its sentinel.
    let (walk_tail0, walk_tail1) = if swapped {
        (tail1, tail0)
    } else {
        (tail0, tail1)
    };
    let sentinel0 = splice_sentinel(positions, walk_tail0, WALK_NODE_0);
    let sentinel1 = splice_sentinel(positions, walk_tail1, WALK_NODE_1);

    let base = len0.min(len1) + 1;
    let mut fp: Vec<FurthestPoint> = (0..len0 + len1 + 3)
        .map(|_| FurthestPoint {
            y: 0,
            lcs: None,
            positions: [usize::MAX; 2],
        })
        .collect();
    // Diagonal -1 seeds the very first snake with the two ring heads.
    fp[base - 1].positions = [positions[sentinel0].next, sentinel1];

    let delta = delta as isize;
    let mut p: isize = 0;
    loop {
        cancel.poll()?;
        for k in -p..delta {
            snake(positions, lcs, &mut fp, base, k, swapped);
        }
        let mut k = delta + p;
        while k >= delta {
            snake(positions, lcs, &mut fp, base, k, swapped);
            k -= 1;
        }
        p += 1;
        if fp[(delta + base as isize) as usize].positions[1] == sentinel1 {
            break;
        }
    }
    let chain = fp[(delta + base as isize) as usize].lcs;

    // Unhook the sentinels so the rings are cyclic again.
    positions[walk_tail0].next = positions[sentinel0].next;
    positions[walk_tail1].next = positions[sentinel1].next;

    tracing::trace!(len0, len1, p, "computed lcs");
    Ok(chain)
}

fn splice_sentinel(positions: &mut Vec<PositionRec>, tail: usize, node: usize) -> usize {
    let id = positions.len();
    positions.push(PositionRec {
        next: positions[tail].next,
        node,
        offset: positions[tail].offset + 1,
    });
    positions[tail].next = id;
    id
}

/// One snake step on diagonal `k`: pick the better predecessor, slide along
/// matching nodes, and record the furthest point plus the run list that
/// reached it.
fn snake(
    positions: &[PositionRec],
    lcs: &mut Vec<LcsRec>,
    fp: &mut [FurthestPoint],
    base: usize,
    k: isize,
    swapped: bool,
) {
    let idx = |k: isize| (k + base as isize) as usize;

    let (start0, start1, previous_lcs);
    if fp[idx(k - 1)].y + 1 > fp[idx(k + 1)].y {
        let below = &fp[idx(k - 1)];
        start0 = below.positions[0];
        start1 = positions[below.positions[1]].next;
        previous_lcs = below.lcs;
    } else {
        let above = &fp[idx(k + 1)];
        start0 = positions[above.positions[0]].next;
        start1 = above.positions[1];
        previous_lcs = above.lcs;
    }

    let mut pos0 = start0;
    let mut pos1 = start1;
    while positions[pos0].node == positions[pos1].node {
        pos0 = positions[pos0].next;
        pos1 = positions[pos1].next;
    }

    let head = if pos1 != start1 {
        let run = lcs.len();
        lcs.push(LcsRec {
            positions: if swapped {
                [start1, start0]
            } else {
                [start0, start1]
            },
            length: positions[pos1].offset - positions[start1].offset,
            next: previous_lcs,
        });
        Some(run)
    } else {
        previous_lcs
    };

    fp[idx(k)] = FurthestPoint {
        y: positions[pos1].offset,
        lcs: head,
        positions: [pos0, pos1],
    };
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::source::SourceKind;
    use crate::token::build_rings;

    /// Collects (offset0, offset1, length) triples of the run list.
    fn runs(
        original: &[u8],
        modified: &[u8],
    ) -> DiffResult<Vec<(usize, usize, usize)>> {
        let mut source = crate::memory::ByteSource::two(original, modified);
        let rings = build_rings(
            &mut source,
            &[SourceKind::Original, SourceKind::Modified],
        )?;
        let mut positions = rings.positions;
        let mut lcs = vec![];
        let head = compute(
            &mut positions,
            &mut lcs,
            rings.tails[0],
            rings.tails[1],
            rings.prefix_lines,
            rings.suffix_lines,
            Cancellation::NONE,
        )?;
        let mut result = vec![];
        let mut current = Some(head);
        while let Some(id) = current {
            let run = &lcs[id];
            result.push((
                positions[run.positions[0]].offset,
                positions[run.positions[1]].offset,
                run.length,
            ));
            current = run.next;
        }
        Ok(result)
    }

    #[test]
    fn test_lcs_identical_sources() {
        // Fully identical inputs collapse into the trimmed suffix plus EOF.
        let runs = runs(b"a\nb\nc\n", b"a\nb\nc\n").unwrap();
        assert_eq!(runs, vec![(1, 1, 3), (4, 4, 0)]);
    }

    #[test]
    fn test_lcs_empty_side_yields_only_eof() {
        let runs = runs(b"a\nb\n", b"").unwrap();
        assert_eq!(runs, vec![(3, 1, 0)]);
    }

    #[test]
    fn test_lcs_both_empty() {
        let runs = runs(b"", b"").unwrap();
        assert_eq!(runs, vec![(1, 1, 0)]);
    }

    #[test]
    fn test_lcs_interleaved_match() {
        // Common subsequence is b, d; the trim fast path eats neither side.
        let runs = runs(b"a\nb\nc\nd\n", b"b\nx\nd\ny\n").unwrap();
        assert_eq!(runs, vec![(2, 1, 1), (4, 3, 1), (5, 5, 0)]);
    }

    #[test]
    fn test_lcs_trimmed_prefix_and_suffix_are_reattached() {
        let runs = runs(b"same\nold\nsame\n", b"same\nnew\nsame\n").unwrap();
        // Leading run for the prefix, trailing run for the suffix, then EOF.
        assert_eq!(runs, vec![(1, 1, 1), (3, 3, 1), (4, 4, 0)]);
    }

    #[test]
    fn test_lcs_cancellation() {
        let mut source = crate::memory::ByteSource::two(b"a\nx\n", b"b\ny\n");
        let rings = build_rings(
            &mut source,
            &[SourceKind::Original, SourceKind::Modified],
        )
        .unwrap();
        let mut positions = rings.positions;
        let mut lcs = vec![];
        let check = || true;
        let result = compute(
            &mut positions,
            &mut lcs,
            rings.tails[0],
            rings.tails[1],
            0,
            0,
            Cancellation::new(&check),
        );
        assert!(matches!(
            result,
            Err(crate::diff::DiffError::Cancelled)
        ));
    }
}
