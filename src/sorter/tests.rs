use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use super::*;
use crate::key::KeyExtractor;
use crate::runtime::{ProgressSink, SilentProgress};

fn config_small(tmp: &std::path::Path) -> SortConfig {
    SortConfig {
        key_fields: vec![0],
        in_sep: b';',
        out_sep: b';',
        header: false,
        output_header: false,
        worker_count: 2,
        total_memory: 256 * 1024 * 1024,
        tmp_dir: Some(tmp.to_path_buf()),
    }
}

/// Tight memory: forces the multi-pass split path on files of a few MiB.
fn config_external(tmp: &std::path::Path) -> SortConfig {
    SortConfig {
        key_fields: vec![0],
        in_sep: b';',
        out_sep: b';',
        header: false,
        output_header: false,
        worker_count: 4,
        total_memory: 24 * 1024 * 1024,
        tmp_dir: Some(tmp.to_path_buf()),
    }
}

fn write_shuffled(path: &std::path::Path, count: u64, payload: usize) {
    let mut f = std::io::BufWriter::new(std::fs::File::create(path).unwrap());
    for i in 0..count {
        writeln!(
            f,
            "k{:06};{}",
            (i * 48271) % count,
            "v".repeat(payload)
        )
        .unwrap();
    }
    f.into_inner().unwrap();
}

fn assert_sorted_by_key(data: &[u8], sep: u8) {
    let ex = KeyExtractor::new(&[0], sep);
    let mut prev: Option<crate::key::Key> = None;
    for line in data.split(|&b| b == b'\n') {
        if line.is_empty() {
            continue;
        }
        let key = ex.extract(line).key;
        if let Some(p) = &prev {
            assert!(*p <= key, "output not key-ascending");
        }
        prev = Some(key);
    }
}

fn line_multiset(data: &[u8]) -> Vec<Vec<u8>> {
    let mut lines: Vec<Vec<u8>> = data
        .split(|&b| b == b'\n')
        .filter(|l| !l.is_empty())
        .map(|l| l.to_vec())
        .collect();
    lines.sort();
    lines
}

fn assert_no_leftovers(dir: &std::path::Path, keep: &[&str]) {
    let leftovers: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .filter(|name| !keep.contains(&name.as_str()))
        .collect();
    assert!(leftovers.is_empty(), "leftover files: {:?}", leftovers);
}

#[test]
fn test_three_records_with_header() {
    // header kept, records sorted by key column, equal keys stable
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    std::fs::write(&input, b"Key1;V1\nk2;a\nk1;b\nk2;c\n").unwrap();

    let mut config = config_small(dir.path());
    config.header = true;
    config.output_header = true;
    let driver = SortDriver::new(config, &SilentProgress);
    let summary = driver.sort(&input, &output).unwrap();
    assert_eq!(summary.sorted_records, 3);

    let out = std::fs::read(&output).unwrap();
    assert_eq!(out, b"Key1;V1\nk1;b\nk2;a\nk2;c\n");
}

#[test]
fn test_in_memory_sort_preserves_records() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    write_shuffled(&input, 10_000, 4);

    let driver = SortDriver::new(config_small(dir.path()), &SilentProgress);
    let summary = driver.sort(&input, &output).unwrap();
    assert_eq!(summary.sorted_records, 10_000);

    let out = std::fs::read(&output).unwrap();
    assert_sorted_by_key(&out, b';');
    assert_eq!(line_multiset(&out), line_multiset(&std::fs::read(&input).unwrap()));
}

#[test]
fn test_external_sort_multi_pass() {
    // ~10 MiB under a 24 MiB budget: sample, split, distribute, sort, concat
    let dir = tempfile::tempdir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    write_shuffled(&input, 150_000, 56);

    let driver = SortDriver::new(config_external(tmp.path()), &SilentProgress);
    let summary = driver.sort(&input, &output).unwrap();
    assert_eq!(summary.sorted_records, 150_000);
    assert!(summary.stats.is_clean());

    let out = std::fs::read(&output).unwrap();
    assert_sorted_by_key(&out, b';');
    assert_eq!(line_multiset(&out), line_multiset(&std::fs::read(&input).unwrap()));

    // P9: the temp dir is clean after the run
    assert_no_leftovers(tmp.path(), &[]);
}

#[test]
fn test_external_sort_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    write_shuffled(&input, 120_000, 56);

    let out1 = dir.path().join("out1.txt");
    let out2 = dir.path().join("out2.txt");
    SortDriver::new(config_external(tmp.path()), &SilentProgress)
        .sort(&input, &out1)
        .unwrap();
    SortDriver::new(config_external(tmp.path()), &SilentProgress)
        .sort(&input, &out2)
        .unwrap();
    assert_eq!(std::fs::read(&out1).unwrap(), std::fs::read(&out2).unwrap());
}

#[test]
fn test_sorted_input_is_idempotent() {
    // an already sorted file comes out byte-identical
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    let mut f = std::io::BufWriter::new(std::fs::File::create(&input).unwrap());
    for i in 0..50_000u64 {
        writeln!(f, "k{:06};payload{}", i, i).unwrap();
    }
    f.into_inner().unwrap();

    let driver = SortDriver::new(config_small(dir.path()), &SilentProgress);
    driver.sort(&input, &output).unwrap();
    assert_eq!(std::fs::read(&input).unwrap(), std::fs::read(&output).unwrap());
}

#[test]
fn test_separator_translation_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    std::fs::write(&input, b"k2;b;2\nk1;\"a;a\";1\n").unwrap();

    let mut config = config_small(dir.path());
    config.out_sep = b'\t';
    let driver = SortDriver::new(config, &SilentProgress);
    driver.sort(&input, &output).unwrap();
    assert_eq!(
        std::fs::read(&output).unwrap(),
        b"k1\t\"a;a\"\t1\nk2\tb\t2\n"
    );
}

#[test]
fn test_missing_input() {
    let dir = tempfile::tempdir().unwrap();
    let driver = SortDriver::new(config_small(dir.path()), &SilentProgress);
    let err = driver
        .sort(&dir.path().join("absent.txt"), &dir.path().join("out.txt"))
        .unwrap_err();
    assert!(matches!(err, crate::error::SortError::MissingInput(_)));
    assert!(!dir.path().join("out.txt").exists());
}

#[test]
fn test_empty_input() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    std::fs::write(&input, b"").unwrap();
    let driver = SortDriver::new(config_small(dir.path()), &SilentProgress);
    let err = driver.sort(&input, &dir.path().join("out.txt")).unwrap_err();
    assert!(matches!(err, crate::error::SortError::EmptyInput(_)));
    assert!(!dir.path().join("out.txt").exists());
}

/// Interrupts after a fixed number of refresh checks.
struct InterruptAfter {
    polls: AtomicU64,
    threshold: u64,
}

impl ProgressSink for InterruptAfter {
    fn is_refresh_necessary(&self, _counter: u64) -> bool {
        true
    }
    fn is_interruption_requested(&self) -> bool {
        self.polls.fetch_add(1, Ordering::Relaxed) >= self.threshold
    }
}

#[test]
fn test_interrupted_sort_cleans_everything() {
    let dir = tempfile::tempdir().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let output = dir.path().join("out.txt");
    write_shuffled(&input, 120_000, 56);

    let progress = InterruptAfter {
        polls: AtomicU64::new(0),
        threshold: 50_000,
    };
    let driver = SortDriver::new(config_external(tmp.path()), &progress);
    let err = driver.sort(&input, &output).unwrap_err();
    assert!(err.is_interrupted());
    assert!(!output.exists(), "failed sort must not leave an output");
    assert_no_leftovers(tmp.path(), &[]);
    assert!(input.exists());
}
