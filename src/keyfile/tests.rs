use std::io::Write;

use super::*;
use crate::key::KeyExtractor;
use crate::runtime::SilentProgress;

#[test]
fn test_distinct_keys_written_once() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    std::fs::write(&input, b"k1;a\nk1;b\nk2;c\nk3;d\nk3;e\n").unwrap();
    let output = dir.path().join("keys.txt");

    let ex = KeyExtractor::new(&[0], b';');
    let count =
        extract_keys_to_file(&input, &ex, false, &output, b';', dir.path(), &SilentProgress)
            .unwrap();
    assert_eq!(count, 3);
    assert_eq!(std::fs::read(&output).unwrap(), b"k1\nk2\nk3\n");
}

#[test]
fn test_composite_key_serialization() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    // key columns (0, 2): the second component embeds the separator
    std::fs::write(&input, b"a;x;\"p;q\"\nb;y;r\n").unwrap();
    let output = dir.path().join("keys.txt");

    let ex = KeyExtractor::new(&[0, 2], b';');
    let count =
        extract_keys_to_file(&input, &ex, false, &output, b';', dir.path(), &SilentProgress)
            .unwrap();
    assert_eq!(count, 2);
    assert_eq!(std::fs::read(&output).unwrap(), b"a;\"p;q\"\nb;r\n");
}

#[test]
fn test_header_skipped_and_count_matches() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let mut f = std::io::BufWriter::new(std::fs::File::create(&input).unwrap());
    writeln!(f, "Key;V").unwrap();
    for i in 0..5_000u64 {
        for _ in 0..3 {
            writeln!(f, "k{:05};x", i).unwrap();
        }
    }
    f.into_inner().unwrap();
    let output = dir.path().join("keys.txt");

    let ex = KeyExtractor::new(&[0], b';');
    let count =
        extract_keys_to_file(&input, &ex, true, &output, b';', dir.path(), &SilentProgress)
            .unwrap();
    assert_eq!(count, 5_000);
    let data = std::fs::read(&output).unwrap();
    assert_eq!(data.split(|&b| b == b'\n').filter(|l| !l.is_empty()).count(), 5_000);
}

#[test]
fn test_unsorted_input_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    std::fs::write(&input, b"k2;a\nk1;b\n").unwrap();
    let output = dir.path().join("keys.txt");
    let ex = KeyExtractor::new(&[0], b';');
    let err =
        extract_keys_to_file(&input, &ex, false, &output, b';', dir.path(), &SilentProgress)
            .unwrap_err();
    assert!(matches!(err, crate::error::SortError::UnsortedRecord { .. }));
    assert!(!output.exists());

    // no key task files remain either
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|n| n != "in.txt")
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
}
