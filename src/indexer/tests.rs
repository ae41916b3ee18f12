use std::io::Write;

use super::*;
use crate::runtime::SilentProgress;

fn write_lines(dir: &tempfile::TempDir, name: &str, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    for line in lines {
        writeln!(f, "{}", line).unwrap();
    }
    path
}

#[test]
fn test_index_starts_at_origin() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_lines(&dir, "t.txt", &["aaa", "bbb", "ccc"]);
    let index = index_file(&path, 1024, 4, &SilentProgress).unwrap();
    assert_eq!(index.offsets[0], 0);
    assert_eq!(index.line_indexes[0], 0);
}

#[test]
fn test_index_offsets_are_record_starts() {
    let dir = tempfile::tempdir().unwrap();
    let lines: Vec<String> = (0..100).map(|i| format!("line{:03}", i)).collect();
    let refs: Vec<&str> = lines.iter().map(|s| s.as_str()).collect();
    let path = write_lines(&dir, "t.txt", &refs);
    let data = std::fs::read(&path).unwrap();

    let index = index_file(&path, 64, 2, &SilentProgress).unwrap();
    for (i, &off) in index.offsets.iter().enumerate() {
        let off = off as usize;
        assert!(off == 0 || data[off - 1] == b'\n', "offset {} not a record start", off);
        // line index == number of newlines before the offset
        let newlines = data[..off].iter().filter(|&&b| b == b'\n').count() as u64;
        assert_eq!(index.line_indexes[i], newlines);
    }
    // strictly increasing offsets, final offset at EOF
    assert!(index.offsets.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(*index.offsets.last().unwrap(), data.len() as u64);
    assert_eq!(*index.line_indexes.last().unwrap(), 100);
}

#[test]
fn test_index_small_range_emits_pair() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_lines(&dir, "t.txt", &["only"]);
    let index = index_file(&path, 2, 3, &SilentProgress).unwrap();
    assert!(index.len() >= 2);
    assert_eq!(*index.line_indexes.last().unwrap(), 1);
}

#[test]
fn test_index_no_trailing_newline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("t.txt");
    std::fs::write(&path, b"aa\nbb").unwrap();
    let index = index_file(&path, 3, 1, &SilentProgress).unwrap();
    assert_eq!(*index.offsets.last().unwrap(), 5);
    assert_eq!(*index.line_indexes.last().unwrap(), 2);
}
