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
use tempfile::TempDir;

fn braid() -> Command {
    Command::cargo_bin("braid").unwrap()
}

fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_diff_identical_files_exits_zero_with_no_output() {
    let dir = TempDir::new().unwrap();
    let original = write_file(&dir, "original", "Aa\nBb\n");
    let modified = write_file(&dir, "modified", "Aa\nBb\n");

    braid()
        .arg("diff")
        .arg(&original)
        .arg(&modified)
        .assert()
        .code(0)
        .stdout("");
}

#[test]
fn test_diff_differing_files_exit_one_with_unified_output() {
    let dir = TempDir::new().unwrap();
    let original = write_file(&dir, "original", "Aa\n");
    let modified = write_file(&dir, "modified", "Bb\n");

    let assert = braid()
        .arg("diff")
        .arg(&original)
        .arg(&modified)
        .assert()
        .code(1);
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    // Default headers are `path<TAB>mtime`.
    assert!(stdout.starts_with(&format!("--- {}\t", original.display())));
    assert!(stdout.contains(&format!("+++ {}\t", modified.display())));
    assert!(stdout.contains("@@ -1 +1 @@\n-Aa\n+Bb\n"));
}

#[test]
fn test_diff_ignore_space_options() {
    let dir = TempDir::new().unwrap();
    let original = write_file(&dir, "original", "a b\n");
    let modified = write_file(&dir, "modified", "a   b\n");

    braid()
        .args(["diff", "-b"])
        .arg(&original)
        .arg(&modified)
        .assert()
        .code(0)
        .stdout("");
    braid()
        .args(["diff", "-w"])
        .arg(&original)
        .arg(&modified)
        .assert()
        .code(0)
        .stdout("");
    braid()
        .arg("diff")
        .arg(&original)
        .arg(&modified)
        .assert()
        .code(1);
}

#[test]
fn test_diff_ignore_eol_style_option() {
    let dir = TempDir::new().unwrap();
    let original = write_file(&dir, "original", "Aa\nBb\n");
    let modified = write_file(&dir, "modified", "Aa\r\nBb\r");

    braid()
        .args(["diff", "--ignore-eol-style", "-u"])
        .arg(&original)
        .arg(&modified)
        .assert()
        .code(0)
        .stdout("");
}

#[test]
fn test_diff_missing_file_exits_two() {
    let dir = TempDir::new().unwrap();
    let original = write_file(&dir, "original", "Aa\n");

    braid()
        .arg("diff")
        .arg(&original)
        .arg(dir.path().join("no-such-file"))
        .assert()
        .code(2);
}
