use std::io::Write;

use super::*;
use crate::key::KeyExtractor;
use crate::runtime::SilentProgress;

fn make_file(lines: u64) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.txt");
    let mut f = std::io::BufWriter::new(std::fs::File::create(&path).unwrap());
    for i in 0..lines {
        writeln!(f, "k{:05}\tpayload-{}", i, i).unwrap();
    }
    f.into_inner().unwrap();
    (dir, path)
}

#[test]
fn test_line_count_estimate_close() {
    let (_dir, path) = make_file(20_000);
    let ex = KeyExtractor::new(&[0], b'\t');
    let est = evaluate_key_size(&path, &ex, false, 2, &SilentProgress).unwrap();
    // uniform lines: the extrapolation should land within a few percent
    let lines = est.total_lines as f64;
    assert!((lines - 20_000.0).abs() / 20_000.0 < 0.05, "estimate {}", lines);
}

#[test]
fn test_mean_key_bytes_reasonable() {
    let (_dir, path) = make_file(5_000);
    let ex = KeyExtractor::new(&[0], b'\t');
    let est = evaluate_key_size(&path, &ex, false, 2, &SilentProgress).unwrap();
    // 6 key bytes plus per-key bookkeeping, rounded up
    assert!(est.mean_key_bytes > 6);
    assert!(est.mean_key_bytes < 256, "mean {}", est.mean_key_bytes);
}

#[test]
fn test_header_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.txt");
    std::fs::write(&path, b"Key\tV\nk1\ta\nk2\tb\n").unwrap();
    let ex = KeyExtractor::new(&[0], b'\t');
    let est = evaluate_key_size(&path, &ex, true, 1, &SilentProgress).unwrap();
    // estimates stay positive and bounded on tiny files
    assert!(est.total_lines >= 2);
    assert!(est.mean_key_bytes >= 1);
}

#[test]
fn test_deterministic_between_runs() {
    let (_dir, path) = make_file(3_000);
    let ex = KeyExtractor::new(&[0], b'\t');
    let first = evaluate_key_size(&path, &ex, false, 4, &SilentProgress).unwrap();
    let second = evaluate_key_size(&path, &ex, false, 4, &SilentProgress).unwrap();
    assert_eq!(first.total_lines, second.total_lines);
    assert_eq!(first.mean_key_bytes, second.mean_key_bytes);
}
