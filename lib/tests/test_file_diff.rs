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

//! End-to-end fixtures for diffs and merges over files on disk.

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use braid_lib::file;
use braid_lib::file::DiffFileOptions;
use braid_lib::merge::ConflictDisplayStyle;
use braid_lib::merge::MergeOptions;
use braid_lib::source::Cancellation;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn parse_options(args: &[&str]) -> DiffFileOptions {
    let mut options = DiffFileOptions::default();
    options.parse_args(args.iter().copied()).unwrap();
    options
}

/// Diffs two files with the given diff options and checks the unified
/// output, using the file names as headers.
fn two_way_file_diff(
    names: [&str; 2],
    contents: [&str; 2],
    args: &[&str],
    expected: &str,
) {
    let dir = TempDir::new().unwrap();
    let original = write_file(&dir, names[0], contents[0]);
    let modified = write_file(&dir, names[1], contents[1]);
    let options = parse_options(args);
    let diff = file::diff(&original, &modified, &options, Cancellation::NONE).unwrap();
    let mut out = vec![];
    file::write_unified(
        &mut out,
        &diff,
        &original,
        &modified,
        Some(names[0]),
        Some(names[1]),
        &options,
    )
    .unwrap();
    assert_eq!(String::from_utf8(out).unwrap(), expected);
}

#[test]
fn test_file_unified_basic() {
    two_way_file_diff(
        ["foo6b", "bar6b"],
        ["Aa\nBb\nCc\n", "Aa\nXx\nCc\n"],
        &[],
        "--- foo6b\n\
         +++ bar6b\n\
         @@ -1,3 +1,3 @@\n \
         Aa\n\
         -Bb\n\
         +Xx\n \
         Cc\n",
    );
}

#[test]
fn test_file_unified_ignore_eol_style_prepend() {
    // The CR-terminated lines compare equal to their LF counterparts; the
    // bytes in the output stay verbatim.
    two_way_file_diff(
        ["foo4c", "bar4c"],
        ["Cc\n", "Aa\rBb\rCc\r"],
        &["--ignore-eol-style"],
        "--- foo4c\n\
         +++ bar4c\n\
         @@ -1 +1,3 @@\n\
         +Aa\r\
         +Bb\r \
         Cc\n",
    );
}

#[test]
fn test_file_unified_ignore_eol_style_truncation() {
    two_way_file_diff(
        ["foo5c", "bar5c"],
        ["Aa\r\nBb\r\nCc\r\n", "Cc\n"],
        &["--ignore-eol-style"],
        "--- foo5c\n\
         +++ bar5c\n\
         @@ -1,3 +1 @@\n\
         -Aa\r\n\
         -Bb\r\n \
         Cc\r\n",
    );
}

#[test]
fn test_file_unified_ignore_eol_style_no_difference() {
    two_way_file_diff(
        ["foo5d", "bar5d"],
        [
            "Aa\r\n\r\nBb\r\n\r\nCc\r\n\r\n",
            "Aa\n\nBb\n\nCc\n\n",
        ],
        &["--ignore-eol-style"],
        "",
    );
}

#[test]
fn test_file_unified_ignore_space_change_no_difference() {
    two_way_file_diff(
        ["foo6e", "bar6e"],
        [
            " A a \n B b \r C c \r\n",
            " A  a   \n   B b  \r    C    c    \r\n",
        ],
        &["-b"],
        "",
    );
}

#[test]
fn test_file_unified_ignore_all_space_no_difference() {
    two_way_file_diff(
        ["foo6f", "bar6f"],
        [
            "Aa\nBb\rCc\r\n",
            " A  a   \n   B b  \r    C    c    \r\n",
        ],
        &["-w"],
        "",
    );
}

#[test]
fn test_file_unified_ignore_all_space_and_eol_no_difference() {
    two_way_file_diff(
        ["foo6g", "bar6g"],
        [
            "Aa\nBb\rCc\r\n",
            " A  a   \r   B b  \r\n    C    c    \n",
        ],
        &["-w", "--ignore-eol-style"],
        "",
    );
}

#[test]
fn test_file_merge_with_default_path_labels() {
    let dir = TempDir::new().unwrap();
    let original = write_file(&dir, "older", "Aa\nBb\nCc\n");
    let modified = write_file(&dir, "mine", "Aa\nBb\nCc\nDd\n");
    let latest = write_file(&dir, "yours", "Aa\nBb\nCc\nEe\n");
    let options = DiffFileOptions::default();
    let diff = file::diff3(&original, &modified, &latest, &options, Cancellation::NONE)
        .unwrap();
    assert!(diff.contains_conflicts());

    let mut out = vec![];
    file::write_merge(
        &mut out,
        &diff,
        &original,
        &modified,
        &latest,
        &MergeOptions::default(),
    )
    .unwrap();
    let merged = String::from_utf8(out).unwrap();
    assert_eq!(
        merged,
        format!(
            "Aa\nBb\nCc\n<<<<<<< {}\nDd\n=======\nEe\n>>>>>>> {}\n",
            modified.display(),
            latest.display()
        )
    );
}

#[test]
fn test_file_merge_resolved_style() {
    let dir = TempDir::new().unwrap();
    let original = write_file(&dir, "older", "a\nz\n");
    let modified = write_file(&dir, "mine", "a\nM1\nmid\nM2\nz\n");
    let latest = write_file(&dir, "yours", "a\nL1\nmid\nL2\nz\n");
    let options = DiffFileOptions::default();
    let diff = file::diff3(&original, &modified, &latest, &options, Cancellation::NONE)
        .unwrap();

    let mut out = vec![];
    file::write_merge(
        &mut out,
        &diff,
        &original,
        &modified,
        &latest,
        &MergeOptions {
            style: ConflictDisplayStyle::ResolvedModifiedLatest,
            original_label: Some("older".to_owned()),
            modified_label: Some("mine".to_owned()),
            latest_label: Some("yours".to_owned()),
            ..MergeOptions::default()
        },
    )
    .unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "a\n\
         <<<<<<< mine\n\
         M1\n\
         =======\n\
         L1\n\
         >>>>>>> yours\n\
         mid\n\
         <<<<<<< mine\n\
         M2\n\
         =======\n\
         L2\n\
         >>>>>>> yours\n\
         z\n"
    );
}

#[test]
fn test_file_diff4_via_ancestor() {
    let dir = TempDir::new().unwrap();
    let original = write_file(&dir, "older", "one\ntwo\nthree\n");
    let modified = write_file(&dir, "mine", "zero\none\ntwo\nthree\n");
    let latest = write_file(&dir, "yours", "one\ntwo improved\nthree\n");
    let ancestor = write_file(&dir, "ancestor", "zero\none\ntwo\nthree\n");
    let options = DiffFileOptions::default();
    let diff = file::diff4(
        &original,
        &modified,
        &latest,
        &ancestor,
        &options,
        Cancellation::NONE,
    )
    .unwrap();
    assert!(!diff.contains_conflicts());

    let mut out = vec![];
    file::write_merge(
        &mut out,
        &diff,
        &original,
        &modified,
        &latest,
        &MergeOptions::default(),
    )
    .unwrap();
    assert_eq!(
        String::from_utf8(out).unwrap(),
        "zero\none\ntwo improved\nthree\n"
    );
}

/// With `--ignore-eol-style`, swapping the terminator style of any lines
/// must not change the segment list.
#[test]
fn test_file_eol_insensitivity_property() {
    let dir = TempDir::new().unwrap();
    let base = "alpha\nbravo\ncharlie\ndelta\n";
    let restyled = "alpha\r\nbravo\rcharlie\r\ndelta\n";
    let edited = "alpha\nbravo\nCHANGED\ndelta\n";

    let options = parse_options(&["--ignore-eol-style"]);
    let collect = |a: &Path, b: &Path| {
        let diff = file::diff(a, b, &options, Cancellation::NONE).unwrap();
        diff.segments()
            .iter()
            .map(|segment| {
                (
                    segment.kind,
                    segment.original.start,
                    segment.original.len,
                    segment.modified.start,
                    segment.modified.len,
                )
            })
            .collect::<Vec<_>>()
    };

    let base_path = write_file(&dir, "base", base);
    let restyled_path = write_file(&dir, "restyled", restyled);
    let edited_path = write_file(&dir, "edited", edited);
    assert_eq!(
        collect(&base_path, &edited_path),
        collect(&restyled_path, &edited_path)
    );
}
