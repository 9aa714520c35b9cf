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

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use indoc::indoc;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn braid() -> Command {
    Command::cargo_bin("braid").unwrap()
}

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn merge_fixture(dir: &TempDir) -> [PathBuf; 3] {
    [
        write_file(dir, "older", "Aa\nBb\nCc\n"),
        write_file(dir, "mine", "Aa\nBb\nCc\nDd\n"),
        write_file(dir, "yours", "Aa\nBb\nCc\nEe\n"),
    ]
}

#[test]
fn test_merge_clean_merge_exits_one_with_merged_output() {
    let dir = TempDir::new().unwrap();
    let original = write_file(&dir, "older", "Aa\nBb\nCc\n");
    let modified = write_file(&dir, "mine", "Xx\nAa\nBb\nCc\n");
    let latest = write_file(&dir, "yours", "Aa\nBb\nCc\nYy\n");

    braid()
        .arg("merge")
        .arg(&original)
        .arg(&modified)
        .arg(&latest)
        .assert()
        .code(1)
        .stdout("Xx\nAa\nBb\nCc\nYy\n");
}

#[test]
fn test_merge_identical_sources_exit_zero() {
    let dir = TempDir::new().unwrap();
    let original = write_file(&dir, "older", "Aa\n");
    let modified = write_file(&dir, "mine", "Aa\n");
    let latest = write_file(&dir, "yours", "Aa\n");

    braid()
        .arg("merge")
        .arg(&original)
        .arg(&modified)
        .arg(&latest)
        .assert()
        .code(0)
        .stdout("Aa\n");
}

#[test]
fn test_merge_conflict_markers_use_labels_in_order() {
    let dir = TempDir::new().unwrap();
    let [original, modified, latest] = merge_fixture(&dir);

    let assert = braid()
        .args(["merge", "-L", "mine", "-L", "older", "-L", "yours"])
        .arg(&original)
        .arg(&modified)
        .arg(&latest)
        .assert()
        .code(1);
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert_eq!(
        stdout,
        indoc! {"
            Aa
            Bb
            Cc
            <<<<<<< mine
            Dd
            =======
            Ee
            >>>>>>> yours
        "}
    );
}

#[test]
fn test_merge_conflict_style_modified_original_latest() {
    let dir = TempDir::new().unwrap();
    let [original, modified, latest] = merge_fixture(&dir);

    let assert = braid()
        .args([
            "merge",
            "--conflict-style=modified-original-latest",
            "-L",
            "mine",
            "-L",
            "older",
            "-L",
            "yours",
        ])
        .arg(&original)
        .arg(&modified)
        .arg(&latest)
        .assert()
        .code(1);
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert_eq!(
        stdout,
        indoc! {"
            Aa
            Bb
            Cc
            <<<<<<< mine
            Dd
            ||||||| older
            =======
            Ee
            >>>>>>> yours
        "}
    );
}

#[test]
fn test_merge_conflict_style_resolved_modified_latest() {
    let dir = TempDir::new().unwrap();
    let original = write_file(&dir, "older", "a\nz\n");
    let modified = write_file(&dir, "mine", "a\nM1\nmid\nM2\nz\n");
    let latest = write_file(&dir, "yours", "a\nL1\nmid\nL2\nz\n");

    let assert = braid()
        .args([
            "merge",
            "--conflict-style=resolved-modified-latest",
            "-L",
            "mine",
            "-L",
            "older",
            "-L",
            "yours",
        ])
        .arg(&original)
        .arg(&modified)
        .arg(&latest)
        .assert()
        .code(1);
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    // The agreeing middle of the refined conflict renders as context; only
    // the disagreeing pieces keep markers.
    assert_eq!(
        stdout,
        indoc! {"
            a
            <<<<<<< mine
            M1
            =======
            L1
            >>>>>>> yours
            mid
            <<<<<<< mine
            M2
            =======
            L2
            >>>>>>> yours
            z
        "}
    );
}

#[test]
fn test_merge_conflict_style_only_conflicts() {
    let dir = TempDir::new().unwrap();
    let [original, modified, latest] = merge_fixture(&dir);

    let assert = braid()
        .args([
            "merge",
            "--conflict-style=only-conflicts",
            "-L",
            "mine",
            "-L",
            "older",
            "-L",
            "yours",
        ])
        .arg(&original)
        .arg(&modified)
        .arg(&latest)
        .assert()
        .code(1);
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert_eq!(
        stdout,
        indoc! {"
            @@
            Aa
            Bb
            Cc
            <<<<<<< mine (4,1)
            Dd
            ||||||| older (4,0)
            =======
            Ee
            >>>>>>> yours (4,1)
        "}
    );
}

#[test]
fn test_merge_conflict_style_take_one_side() {
    let dir = TempDir::new().unwrap();
    let [original, modified, latest] = merge_fixture(&dir);

    braid()
        .args(["merge", "--conflict-style=modified"])
        .arg(&original)
        .arg(&modified)
        .arg(&latest)
        .assert()
        .code(1)
        .stdout("Aa\nBb\nCc\nDd\n");
    braid()
        .args(["merge", "--conflict-style=latest"])
        .arg(&original)
        .arg(&modified)
        .arg(&latest)
        .assert()
        .code(1)
        .stdout("Aa\nBb\nCc\nEe\n");
}

#[test]
fn test_merge_rejects_more_than_three_labels() {
    let dir = TempDir::new().unwrap();
    let [original, modified, latest] = merge_fixture(&dir);

    braid()
        .args(["merge", "-L", "a", "-L", "b", "-L", "c", "-L", "d"])
        .arg(&original)
        .arg(&modified)
        .arg(&latest)
        .assert()
        .code(2);
}

#[test]
fn test_merge_with_ancestor_applies_change_through_skew() {
    let dir = TempDir::new().unwrap();
    let original = write_file(&dir, "older", "one\ntwo\nthree\n");
    let modified = write_file(&dir, "mine", "zero\none\ntwo\nthree\n");
    let latest = write_file(&dir, "yours", "one\ntwo improved\nthree\n");
    let ancestor = write_file(&dir, "ancestor", "zero\none\ntwo\nthree\n");

    braid()
        .arg("merge")
        .arg("--ancestor")
        .arg(&ancestor)
        .arg(&original)
        .arg(&modified)
        .arg(&latest)
        .assert()
        .code(1)
        .stdout("zero\none\ntwo improved\nthree\n");
}
