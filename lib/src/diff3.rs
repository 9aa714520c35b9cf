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

//! Three-way diff assembly.
//!
//! Two LCS lists share one token index: original vs modified and original
//! vs latest. The walk advances both in lockstep, driven by original-side
//! sync points, and classifies every interval between sync points as
//! modified-only, latest-only, agreeing (`DiffCommon`) or conflicting.

use crate::diff::Diff;
use crate::diff::DiffResult;
use crate::diff::Segment;
use crate::diff::SegmentKind;
use crate::diff::TokenRange;
use crate::lcs;
use crate::lcs::EOF_NODE;
use crate::lcs::LcsRec;
use crate::source::Cancellation;
use crate::source::SourceKind;
use crate::source::TokenSource;
use crate::token;
use crate::token::PositionRec;

pub(crate) fn three_way<S: TokenSource>(
    source: &mut S,
    cancel: Cancellation,
) -> DiffResult<Diff> {
    let rings = token::build_rings(
        source,
        &[SourceKind::Original, SourceKind::Modified, SourceKind::Latest],
    )?;
    let mut positions = rings.positions;
    let mut lcs_arena = vec![];
    let lcs_om = lcs::compute(
        &mut positions,
        &mut lcs_arena,
        rings.tails[0],
        rings.tails[1],
        rings.prefix_lines,
        rings.suffix_lines,
        cancel,
    )?;
    let lcs_ol = lcs::compute(
        &mut positions,
        &mut lcs_arena,
        rings.tails[0],
        rings.tails[2],
        rings.prefix_lines,
        rings.suffix_lines,
        cancel,
    )?;
    let segments = merge_lcs_pair(
        &mut positions,
        &mut lcs_arena,
        lcs_om,
        lcs_ol,
        rings.tails[1],
        rings.tails[2],
        rings.prefix_lines,
        cancel,
    )?;
    tracing::debug!(segments = segments.len(), "computed three-way diff");
    Ok(Diff::from_segments(segments))
}

fn advance(lcs: &[LcsRec], id: usize) -> usize {
    lcs[id].next
        .expect("only the terminating EOF element has no successor")
}

/// Hooks a linear entry point into a ring so content probes can walk it:
/// the returned cursor is the ring head, and a sentinel one past the tail
/// keeps a probe that runs off the end from wrapping straight into small
/// offsets. An empty ring gets a lone self-referential sentinel.
pub(crate) fn ring_probe_cursor(
    positions: &mut Vec<PositionRec>,
    tail: Option<usize>,
    prefix_lines: usize,
) -> usize {
    match tail {
        Some(tail) => {
            let head = positions[tail].next;
            let sentinel = positions.len();
            positions.push(PositionRec {
                next: head,
                node: EOF_NODE,
                offset: positions[tail].offset + 1,
            });
            positions[tail].next = sentinel;
            head
        }
        None => {
            let sentinel = positions.len();
            positions.push(PositionRec {
                next: sentinel,
                node: EOF_NODE,
                offset: prefix_lines + 1,
            });
            sentinel
        }
    }
}

#[expect(clippy::too_many_arguments)]
fn merge_lcs_pair(
    positions: &mut Vec<PositionRec>,
    lcs_arena: &mut Vec<LcsRec>,
    mut lcs_om: usize,
    mut lcs_ol: usize,
    modified_tail: Option<usize>,
    latest_tail: Option<usize>,
    prefix_lines: usize,
    cancel: Cancellation,
) -> DiffResult<Vec<Segment>> {
    let mut segments = vec![];

    let mut original_start = 1;
    let mut modified_start = 1;
    let mut latest_start = 1;

    let mut mod_cursor = ring_probe_cursor(positions, modified_tail, prefix_lines);
    let mut lat_cursor = ring_probe_cursor(positions, latest_tail, prefix_lines);

    loop {
        cancel.poll()?;

        // Find the next original-side offset both LCS lists can reach.
        let original_sync = loop {
            let om0 = positions[lcs_arena[lcs_om].positions[0]].offset;
            let ol0 = positions[lcs_arena[lcs_ol].positions[0]].offset;
            if om0 > ol0 {
                let sync = om0;
                while positions[lcs_arena[lcs_ol].positions[0]].offset + lcs_arena[lcs_ol].length
                    < sync
                {
                    lcs_ol = advance(lcs_arena, lcs_ol);
                }
                // If the sync point is the EOF and this run stops exactly
                // short of it without reaching the next run, skip it; a
                // genuine end of file is left alone.
                if lcs_arena[lcs_om].length == 0
                    && lcs_arena[lcs_ol].length > 0
                    && positions[lcs_arena[lcs_ol].positions[0]].offset + lcs_arena[lcs_ol].length
                        == sync
                    && positions[lcs_arena[lcs_ol].positions[1]].offset + lcs_arena[lcs_ol].length
                        != positions[lcs_arena[advance(lcs_arena, lcs_ol)].positions[1]].offset
                {
                    lcs_ol = advance(lcs_arena, lcs_ol);
                }
                if positions[lcs_arena[lcs_ol].positions[0]].offset <= sync {
                    break sync;
                }
            } else {
                let sync = ol0;
                while positions[lcs_arena[lcs_om].positions[0]].offset + lcs_arena[lcs_om].length
                    < sync
                {
                    lcs_om = advance(lcs_arena, lcs_om);
                }
                if lcs_arena[lcs_ol].length == 0
                    && lcs_arena[lcs_om].length > 0
                    && positions[lcs_arena[lcs_om].positions[0]].offset + lcs_arena[lcs_om].length
                        == sync
                    && positions[lcs_arena[lcs_om].positions[1]].offset + lcs_arena[lcs_om].length
                        != positions[lcs_arena[advance(lcs_arena, lcs_om)].positions[1]].offset
                {
                    lcs_om = advance(lcs_arena, lcs_om);
                }
                if positions[lcs_arena[lcs_om].positions[0]].offset <= sync {
                    break sync;
                }
            }
        };

        let modified_sync = positions[lcs_arena[lcs_om].positions[1]].offset
            + (original_sync - positions[lcs_arena[lcs_om].positions[0]].offset);
        let latest_sync = positions[lcs_arena[lcs_ol].positions[1]].offset
            + (original_sync - positions[lcs_arena[lcs_ol].positions[0]].offset);

        let is_modified = positions[lcs_arena[lcs_om].positions[0]].offset > original_start
            || positions[lcs_arena[lcs_om].positions[1]].offset > modified_start;
        let is_latest = positions[lcs_arena[lcs_ol].positions[0]].offset > original_start
            || positions[lcs_arena[lcs_ol].positions[1]].offset > latest_start;

        if is_modified || is_latest {
            let original_length = original_sync - original_start;
            let modified_length = modified_sync - modified_start;
            let latest_length = latest_sync - latest_start;
            let mut resolved = None;

            let kind = if is_modified && is_latest {
                // Line the probe cursors up with the interval and walk them
                // while the contents agree.
                while positions[mod_cursor].offset < modified_start {
                    mod_cursor = positions[mod_cursor].next;
                }
                while positions[lat_cursor].offset < latest_start {
                    lat_cursor = positions[lat_cursor].next;
                }
                let probe_start = [mod_cursor, lat_cursor];
                let mut remaining = modified_length.min(latest_length);
                while remaining > 0 && positions[mod_cursor].node == positions[lat_cursor].node {
                    mod_cursor = positions[mod_cursor].next;
                    lat_cursor = positions[lat_cursor].next;
                    remaining -= 1;
                }
                if modified_length != latest_length || remaining > 0 {
                    resolved = Some(resolve_conflict(
                        positions,
                        lcs_arena,
                        probe_start,
                        remaining,
                        TokenRange::new(original_start - 1, original_length),
                        modified_start,
                        modified_length,
                        latest_start,
                        latest_length,
                        &mut mod_cursor,
                        &mut lat_cursor,
                        cancel,
                    )?);
                    SegmentKind::Conflict
                } else {
                    SegmentKind::DiffCommon
                }
            } else if is_modified {
                SegmentKind::Modified
            } else {
                SegmentKind::Latest
            };

            segments.push(Segment {
                kind,
                original: TokenRange::new(original_start - 1, original_length),
                modified: TokenRange::new(modified_start - 1, modified_length),
                latest: TokenRange::new(latest_start - 1, latest_length),
                resolved,
            });
        }

        // EOF on either side ends the walk; EOF is a sync point, so the
        // interval before it has just been emitted.
        if lcs_arena[lcs_om].length == 0 || lcs_arena[lcs_ol].length == 0 {
            break;
        }

        let modified_remaining = lcs_arena[lcs_om].length
            - (original_sync - positions[lcs_arena[lcs_om].positions[0]].offset);
        let latest_remaining = lcs_arena[lcs_ol].length
            - (original_sync - positions[lcs_arena[lcs_ol].positions[0]].offset);
        let common_length = modified_remaining.min(latest_remaining);

        segments.push(Segment {
            kind: SegmentKind::Common,
            original: TokenRange::new(original_sync - 1, common_length),
            modified: TokenRange::new(modified_sync - 1, common_length),
            latest: TokenRange::new(latest_sync - 1, common_length),
            resolved: None,
        });

        original_start = original_sync + common_length;
        modified_start = modified_sync + common_length;
        latest_start = latest_sync + common_length;

        // Re-anchor the probe cursors at the current runs' start positions
        // so later probes stay on the ring.
        mod_cursor = lcs_arena[lcs_om].positions[1];
        lat_cursor = lcs_arena[lcs_ol].positions[1];

        while original_start
            >= positions[lcs_arena[lcs_om].positions[0]].offset + lcs_arena[lcs_om].length
            && lcs_arena[lcs_om].length > 0
        {
            lcs_om = advance(lcs_arena, lcs_om);
        }
        while original_start
            >= positions[lcs_arena[lcs_ol].positions[0]].offset + lcs_arena[lcs_ol].length
            && lcs_arena[lcs_ol].length > 0
        {
            lcs_ol = advance(lcs_arena, lcs_ol);
        }
    }

    Ok(segments)
}

/// Refines a conflict into nested agreeing and conflicting pieces.
///
/// Builds a secondary LCS between the modified and latest sub-ranges by
/// temporarily cutting each range out of its ring, then assembles a
/// sub-segment list that alternates `DiffCommon` and `Conflict`. A shared
/// leading run found by the caller's probe becomes an explicit head run.
/// Every sub-segment carries the enclosing conflict's original range.
#[expect(clippy::too_many_arguments)]
pub(crate) fn resolve_conflict(
    positions: &mut Vec<PositionRec>,
    lcs_arena: &mut Vec<LcsRec>,
    probe_start: [usize; 2],
    remaining_common: usize,
    original: TokenRange,
    modified_start: usize,
    modified_length: usize,
    latest_start: usize,
    latest_length: usize,
    mod_cursor: &mut usize,
    lat_cursor: &mut usize,
    cancel: Cancellation,
) -> DiffResult<Vec<Segment>> {
    let leading_common = modified_length.min(latest_length) - remaining_common;
    let mut sub_modified_length = modified_length - leading_common;
    let mut sub_latest_length = latest_length - leading_common;

    // Cut a temporary ring out of each side, covering the part of the
    // conflict after any shared leading run. The cursors sit at the first
    // disagreeing positions.
    let sub_head0 = *mod_cursor;
    let sub_head1 = *lat_cursor;
    let ring0 = if sub_modified_length == 0 {
        None
    } else {
        let mut cursor = *mod_cursor;
        while sub_modified_length > 1 {
            cursor = positions[cursor].next;
            sub_modified_length -= 1;
        }
        *mod_cursor = positions[cursor].next;
        positions[cursor].next = sub_head0;
        Some(cursor)
    };
    let ring1 = if sub_latest_length == 0 {
        None
    } else {
        let mut cursor = *lat_cursor;
        while sub_latest_length > 1 {
            cursor = positions[cursor].next;
            sub_latest_length -= 1;
        }
        *lat_cursor = positions[cursor].next;
        positions[cursor].next = sub_head1;
        Some(cursor)
    };

    let computed = lcs::compute(positions, lcs_arena, ring0, ring1, 0, 0, cancel)?;

    // Reconnect the rings.
    if let Some(tail) = ring0 {
        positions[tail].next = *mod_cursor;
    }
    if let Some(tail) = ring1 {
        positions[tail].next = *lat_cursor;
    }

    // An empty side left its EOF element at the placeholder offset 1; point
    // it at the position just past the conflict instead.
    let mut eof = computed;
    while let Some(next) = lcs_arena[eof].next {
        eof = next;
    }
    if ring0.is_none() {
        lcs_arena[eof].positions[0] = *mod_cursor;
    }
    if ring1.is_none() {
        lcs_arena[eof].positions[1] = *lat_cursor;
    }

    let head = if leading_common > 0 {
        let lead = lcs_arena.len();
        lcs_arena.push(LcsRec {
            positions: probe_start,
            length: leading_common,
            next: Some(computed),
        });
        lead
    } else {
        computed
    };

    // Walk the refinement list the same way the two-way assembly does,
    // emitting `Conflict` for gaps and `DiffCommon` for runs.
    let mut sub_segments = vec![];
    let mut modified_cursor = modified_start;
    let mut latest_cursor = latest_start;
    let mut current = Some(head);
    while let Some(id) = current {
        let run = &lcs_arena[id];
        let run_start0 = positions[run.positions[0]].offset;
        let run_start1 = positions[run.positions[1]].offset;
        if modified_cursor < run_start0 || latest_cursor < run_start1 {
            sub_segments.push(Segment {
                kind: SegmentKind::Conflict,
                original,
                modified: TokenRange::new(modified_cursor - 1, run_start0 - modified_cursor),
                latest: TokenRange::new(latest_cursor - 1, run_start1 - latest_cursor),
                resolved: None,
            });
        }
        if run.length == 0 {
            break;
        }
        modified_cursor = run_start0;
        latest_cursor = run_start1;
        sub_segments.push(Segment {
            kind: SegmentKind::DiffCommon,
            original,
            modified: TokenRange::new(modified_cursor - 1, run.length),
            latest: TokenRange::new(latest_cursor - 1, run.length),
            resolved: None,
        });
        modified_cursor += run.length;
        latest_cursor += run.length;
        current = run.next;
    }

    Ok(sub_segments)
}
