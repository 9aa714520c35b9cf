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

//! Four-way diff assembly.
//!
//! Used when the modified source is not based on the original but on a
//! separate common ancestor, e.g. when merging a change across divergent
//! branches. The original→latest diff is computed first, then every range
//! is re-expressed in the modified source's coordinates by mapping it
//! latest→ancestor→modified; the ancestor thereby absorbs the skew that
//! would otherwise turn every mine-side difference into a conflict.

use itertools::Itertools as _;

use crate::diff::Diff;
use crate::diff::DiffResult;
use crate::diff::Segment;
use crate::diff::SegmentKind;
use crate::diff::TokenRange;
use crate::diff::lcs_to_segments;
use crate::diff3::resolve_conflict;
use crate::diff3::ring_probe_cursor;
use crate::lcs;
use crate::lcs::LcsRec;
use crate::source::Cancellation;
use crate::source::SourceKind;
use crate::source::TokenSource;
use crate::token;
use crate::token::PositionRec;

pub(crate) fn four_way<S: TokenSource>(
    source: &mut S,
    cancel: Cancellation,
) -> DiffResult<Diff> {
    let rings = token::build_rings(
        source,
        &[
            SourceKind::Original,
            SourceKind::Modified,
            SourceKind::Latest,
            SourceKind::Ancestor,
        ],
    )?;
    let mut positions = rings.positions;
    let mut lcs_arena = vec![];
    let prefix = rings.prefix_lines;
    let suffix = rings.suffix_lines;
    let [original_tail, modified_tail, latest_tail, ancestor_tail] = rings.tails[..]
        .try_into()
        .expect("four rings were requested");

    // Their change, with common runs kept: original vs latest.
    let lcs_ol = lcs::compute(
        &mut positions,
        &mut lcs_arena,
        original_tail,
        latest_tail,
        prefix,
        suffix,
        cancel,
    )?;
    let mut segments = lcs_to_segments(&positions, &lcs_arena, lcs_ol, 1, 1, true);
    // The two-way assembly put the latest data in the modified slots; move
    // it over and seed the modified ranges from it.
    for segment in &mut segments {
        segment.latest = segment.modified;
        if segment.kind == SegmentKind::Modified {
            segment.kind = SegmentKind::Latest;
        }
    }

    // Map the modified ranges out of latest space: first back to ancestor
    // space through the ancestor→latest diff, then forward into modified
    // space through the ancestor→modified diff.
    let lcs_al = lcs::compute(
        &mut positions,
        &mut lcs_arena,
        ancestor_tail,
        latest_tail,
        prefix,
        suffix,
        cancel,
    )?;
    let adjust_al = lcs_to_segments(&positions, &lcs_arena, lcs_al, 1, 1, false);
    let mut to_ancestor = AdjustCursor::new(&adjust_al, true);
    for segment in &mut segments {
        segment.modified = to_ancestor.map_range(segment.modified);
    }
    let ancestor_ranges = segments
        .iter()
        .map(|segment| segment.modified)
        .collect_vec();

    let lcs_am = lcs::compute(
        &mut positions,
        &mut lcs_arena,
        ancestor_tail,
        modified_tail,
        prefix,
        suffix,
        cancel,
    )?;
    let adjust_am = lcs_to_segments(&positions, &lcs_arena, lcs_am, 1, 1, false);
    let mut to_modified = AdjustCursor::new(&adjust_am, false);
    for segment in &mut segments {
        segment.modified = to_modified.map_range(segment.modified);
    }

    // The mapping is monotone but need not tile the modified source; fold
    // every mine-side insertion into the segment that follows it so that
    // coverage holds and insertions into theirs-unchanged regions survive
    // the merge.
    let modified_total =
        modified_tail.map_or(prefix, |tail| positions[tail].offset) + suffix;
    let mut previous_end = 0;
    let count = segments.len();
    for (i, segment) in segments.iter_mut().enumerate() {
        let end = if i + 1 == count {
            modified_total
        } else {
            segment.modified.end().max(previous_end)
        };
        segment.modified = TokenRange::new(previous_end, end - previous_end);
        previous_end = end;
    }

    let latest_total = latest_tail.map_or(prefix, |tail| positions[tail].offset) + suffix;
    let ancestor_total =
        ancestor_tail.map_or(prefix, |tail| positions[tail].offset) + suffix;
    classify(
        &mut positions,
        &mut lcs_arena,
        &mut segments,
        &ancestor_ranges,
        [modified_tail, latest_tail, ancestor_tail],
        [modified_total, latest_total, ancestor_total],
        prefix,
        suffix,
        cancel,
    )?;

    tracing::debug!(segments = segments.len(), "computed four-way diff");
    Ok(Diff::from_segments(segments))
}

/// Decides what each pre-aligned segment means for the merge, by walking
/// the rings and comparing node identities:
///
/// * theirs-unchanged ranges where mine changed become `Modified`;
/// * theirs-changed ranges where mine agrees with theirs become
///   `DiffCommon`, where mine still matches the ancestor stay `Latest`,
///   and everything else becomes a `Conflict` refined like a three-way
///   conflict.
#[expect(clippy::too_many_arguments)]
fn classify(
    positions: &mut Vec<PositionRec>,
    lcs_arena: &mut Vec<LcsRec>,
    segments: &mut [Segment],
    ancestor_ranges: &[TokenRange],
    tails: [Option<usize>; 3],
    totals: [usize; 3],
    prefix_lines: usize,
    suffix_lines: usize,
    cancel: Cancellation,
) -> DiffResult<()> {
    let [modified_total, latest_total, ancestor_total] = totals;
    let mut mod_cursor = ring_probe_cursor(positions, tails[0], prefix_lines);
    let mut lat_cursor = ring_probe_cursor(positions, tails[1], prefix_lines);
    let mut anc_cursor = ring_probe_cursor(positions, tails[2], prefix_lines);

    for (segment, ancestor_range) in segments.iter_mut().zip(ancestor_ranges) {
        cancel.poll()?;
        seek(positions, &mut mod_cursor, segment.modified.start + 1);

        let modified_matches_latest = segment.modified.len == segment.latest.len && {
            seek(positions, &mut lat_cursor, segment.latest.start + 1);
            ranges_match(
                positions,
                ProbeSide::new(mod_cursor, segment.modified, modified_total),
                ProbeSide::new(lat_cursor, segment.latest, latest_total),
                prefix_lines,
                suffix_lines,
            )
        };
        match segment.kind {
            SegmentKind::Common => {
                if !modified_matches_latest {
                    // Theirs did not touch this range but mine did.
                    segment.kind = SegmentKind::Modified;
                }
            }
            SegmentKind::Latest => {
                if modified_matches_latest {
                    segment.kind = SegmentKind::DiffCommon;
                    continue;
                }
                let modified_matches_ancestor =
                    segment.modified.len == ancestor_range.len && {
                        seek(positions, &mut anc_cursor, ancestor_range.start + 1);
                        ranges_match(
                            positions,
                            ProbeSide::new(mod_cursor, segment.modified, modified_total),
                            ProbeSide::new(anc_cursor, *ancestor_range, ancestor_total),
                            prefix_lines,
                            suffix_lines,
                        )
                    };
                if modified_matches_ancestor {
                    continue;
                }
                // Mine and theirs both changed this range and disagree.
                segment.kind = SegmentKind::Conflict;
                let modified_start = segment.modified.start + 1;
                let latest_start = segment.latest.start + 1;
                let mut remaining = segment.modified.len.min(segment.latest.len);
                seek(positions, &mut lat_cursor, latest_start);
                let probe_start = [mod_cursor, lat_cursor];
                while remaining > 0
                    && positions[mod_cursor].node == positions[lat_cursor].node
                {
                    mod_cursor = positions[mod_cursor].next;
                    lat_cursor = positions[lat_cursor].next;
                    remaining -= 1;
                }
                segment.resolved = Some(resolve_conflict(
                    positions,
                    lcs_arena,
                    probe_start,
                    remaining,
                    segment.original,
                    modified_start,
                    segment.modified.len,
                    latest_start,
                    segment.latest.len,
                    &mut mod_cursor,
                    &mut lat_cursor,
                    cancel,
                )?);
            }
            _ => {}
        }
    }
    Ok(())
}

fn seek(positions: &[PositionRec], cursor: &mut usize, offset: usize) {
    while positions[*cursor].offset < offset {
        *cursor = positions[*cursor].next;
    }
}

/// One side of a content probe: a ring cursor at (or before) the range
/// start, the 0-based range, and the total token count of the source.
struct ProbeSide {
    cursor: usize,
    range: TokenRange,
    total: usize,
}

impl ProbeSide {
    fn new(cursor: usize, range: TokenRange, total: usize) -> Self {
        Self {
            cursor,
            range,
            total,
        }
    }
}

#[derive(PartialEq)]
enum Zone {
    Prefix,
    Middle,
    Suffix,
}

fn zone(offset: usize, total: usize, prefix_lines: usize, suffix_lines: usize) -> Zone {
    if offset <= prefix_lines {
        Zone::Prefix
    } else if offset > total - suffix_lines {
        Zone::Suffix
    } else {
        Zone::Middle
    }
}

/// Whether two equally-long ranges hold the same tokens.
///
/// Tokens inside the trimmed common prefix or suffix are not on the rings,
/// but the trim guarantees what they are: prefix tokens are equal exactly
/// when their offsets agree, suffix tokens when their distances from the
/// end agree. Everything else is compared by node identity. The callers'
/// cursors are not advanced.
fn ranges_match(
    positions: &[PositionRec],
    a: ProbeSide,
    b: ProbeSide,
    prefix_lines: usize,
    suffix_lines: usize,
) -> bool {
    debug_assert_eq!(a.range.len, b.range.len);
    let mut a_cursor = a.cursor;
    let mut b_cursor = b.cursor;
    for i in 0..a.range.len {
        let a_offset = a.range.start + 1 + i;
        let b_offset = b.range.start + 1 + i;
        let a_zone = zone(a_offset, a.total, prefix_lines, suffix_lines);
        let b_zone = zone(b_offset, b.total, prefix_lines, suffix_lines);
        match (a_zone, b_zone) {
            (Zone::Prefix, Zone::Prefix) => {
                if a_offset != b_offset {
                    return false;
                }
            }
            (Zone::Suffix, Zone::Suffix) => {
                if a.total - a_offset != b.total - b_offset {
                    return false;
                }
            }
            (Zone::Middle, Zone::Middle) => {
                while positions[a_cursor].offset < a_offset {
                    a_cursor = positions[a_cursor].next;
                }
                while positions[b_cursor].offset < b_offset {
                    b_cursor = positions[b_cursor].next;
                }
                if positions[a_cursor].node != positions[b_cursor].node {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}

/// Translates points between the two sides of a changed-ranges-only diff.
///
/// Points in unchanged regions shift by the accumulated length delta;
/// points inside a changed range clamp into the corresponding range on the
/// other side. Queries must arrive in non-decreasing order.
struct AdjustCursor<'a> {
    segments: &'a [Segment],
    /// Map from the modified side back to the original side.
    reverse: bool,
    index: usize,
    delta: isize,
}

impl<'a> AdjustCursor<'a> {
    fn new(segments: &'a [Segment], reverse: bool) -> Self {
        Self {
            segments,
            reverse,
            index: 0,
            delta: 0,
        }
    }

    fn ranges(&self, index: usize) -> (TokenRange, TokenRange) {
        let segment = &self.segments[index];
        if self.reverse {
            (segment.modified, segment.original)
        } else {
            (segment.original, segment.modified)
        }
    }

    fn map_point(&mut self, point: usize) -> usize {
        while self.index < self.segments.len() {
            let (from, to) = self.ranges(self.index);
            if from.end() <= point {
                self.delta += to.len as isize - from.len as isize;
                self.index += 1;
                continue;
            }
            if from.start < point {
                return to.start + (point - from.start).min(to.len);
            }
            break;
        }
        point
            .checked_add_signed(self.delta)
            .expect("adjustment never maps a point below zero")
    }

    fn map_range(&mut self, range: TokenRange) -> TokenRange {
        let start = self.map_point(range.start);
        let end = self.map_point(range.end());
        TokenRange::new(start, end - start)
    }
}

#[cfg(test)]
mod tests {
    use bstr::BString;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::memory::ByteSource;
    use crate::memory::split_lines;

    fn four(original: &[u8], modified: &[u8], latest: &[u8], ancestor: &[u8]) -> Diff {
        let mut source = ByteSource::four(original, modified, latest, ancestor);
        Diff::four_way(&mut source, Cancellation::NONE).unwrap()
    }

    /// Applies the merge policy by hand: modified bytes for common and
    /// modified ranges, latest bytes for latest and agreeing ranges.
    fn merged(diff: &Diff, modified: &[u8], latest: &[u8]) -> BString {
        let modified_lines = split_lines(modified);
        let latest_lines = split_lines(latest);
        let mut out = BString::default();
        for segment in diff.segments() {
            let (lines, range) = match segment.kind {
                SegmentKind::Common | SegmentKind::Modified => {
                    (&modified_lines, segment.modified)
                }
                _ => (&latest_lines, segment.latest),
            };
            for line in &lines[range.start..range.end()] {
                out.extend_from_slice(line);
            }
        }
        out
    }

    #[test]
    fn test_four_way_takes_their_change_when_mine_matches_ancestor() {
        // Modified is a pristine copy of the ancestor, so the original→
        // latest change applies cleanly.
        let original = b"a\nb\nc\n";
        let latest = b"a\nB\nc\n";
        let ancestor = b"intro\na\nb\nc\n";
        let modified = b"intro\na\nb\nc\n";
        let diff = four(original, modified, latest, ancestor);
        assert!(!diff.contains_conflicts());
        assert_eq!(merged(&diff, modified, latest), "intro\na\nB\nc\n");
    }

    #[test]
    fn test_four_way_keeps_my_change_in_unchanged_region() {
        // Theirs only touched "b"; my edit to "c" rides along even though
        // my base (the ancestor) is shifted against the original.
        let original = b"a\nb\nc\n";
        let latest = b"a\nB\nc\n";
        let ancestor = b"intro\na\nb\nc\n";
        let modified = b"intro\na\nb\nC mine\n";
        let diff = four(original, modified, latest, ancestor);
        assert!(!diff.contains_conflicts());
        assert_eq!(merged(&diff, modified, latest), "intro\na\nB\nC mine\n");
    }

    #[test]
    fn test_four_way_agreeing_edits_do_not_conflict() {
        let original = b"a\nb\nc\n";
        let latest = b"a\nX\nc\n";
        let ancestor = b"a\nb\nc\n";
        let modified = b"a\nX\nc\n";
        let diff = four(original, modified, latest, ancestor);
        assert!(!diff.contains_conflicts());
        assert_eq!(merged(&diff, modified, latest), "a\nX\nc\n");
    }

    #[test]
    fn test_four_way_conflicting_edits_conflict() {
        let original = b"a\nb\nc\n";
        let latest = b"a\nTHEIRS\nc\n";
        let ancestor = b"a\nb\nc\n";
        let modified = b"a\nMINE\nc\n";
        let diff = four(original, modified, latest, ancestor);
        assert!(diff.contains_conflicts());
        let conflict = diff
            .segments()
            .iter()
            .find(|segment| segment.kind == SegmentKind::Conflict)
            .unwrap();
        assert_eq!(conflict.modified.len, 1);
        assert_eq!(conflict.latest.len, 1);
    }

    #[test]
    fn test_four_way_coverage_of_modified() {
        let original = b"a\nb\nc\nd\n";
        let latest = b"a\nb2\nc\nd\ne\n";
        let ancestor = b"z\na\nb\nc\nd\n";
        let modified = b"z\na\nb\nmine\nc\nd\n";
        let diff = four(original, modified, latest, ancestor);
        let mut next = 0;
        for segment in diff.segments() {
            assert_eq!(segment.modified.start, next);
            next = segment.modified.end();
        }
        assert_eq!(next, 6);
    }
}
