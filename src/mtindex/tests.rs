use std::io::Write;

use super::*;
use crate::runtime::SilentProgress;

/// Root: one 9-byte record per key. Secondary: ten 10-byte records per root
/// key. Fixed record widths make positions checkable by arithmetic.
fn two_table_fixture(
    dir: &tempfile::TempDir,
    root_records: u64,
) -> (std::path::PathBuf, std::path::PathBuf) {
    let root = dir.path().join("root.txt");
    let mut f = std::io::BufWriter::new(std::fs::File::create(&root).unwrap());
    for i in 1..=root_records {
        writeln!(f, "k{:05};a", i).unwrap();
    }
    f.into_inner().unwrap();

    let secondary = dir.path().join("secondary.txt");
    let mut f = std::io::BufWriter::new(std::fs::File::create(&secondary).unwrap());
    for i in 1..=root_records {
        for d in 0..10 {
            writeln!(f, "k{:05};s{}", i, d).unwrap();
        }
    }
    f.into_inner().unwrap();
    (root, secondary)
}

fn config(slaves: usize, forced: Option<u64>) -> IndexationConfig {
    IndexationConfig {
        sep: b';',
        header: false,
        slave_count: slaves,
        slave_memory: 64 * 1024 * 1024,
        forced_max_size_per_process: forced,
    }
}

#[test]
fn test_two_table_plan_invariants() {
    let dir = tempfile::tempdir().unwrap();
    let (root, secondary) = two_table_fixture(&dir, 10_000);
    let root_size = std::fs::metadata(&root).unwrap().len();
    let secondary_size = std::fs::metadata(&secondary).unwrap().len();

    let tables = vec![
        TableSpec {
            path: root,
            key_fields: vec![0],
            used: true,
        },
        TableSpec {
            path: secondary,
            key_fields: vec![0],
            used: true,
        },
    ];
    let plan =
        compute_indexation(&tables, &config(2, Some(150_000)), &SilentProgress).unwrap();

    assert!(plan.len() > 3, "expected several chunks, got {}", plan.len());
    assert!(plan.len() < 60, "unexpectedly many chunks: {}", plan.len());

    // boundaries tile both files exactly
    for t in 0..2 {
        assert_eq!(plan.chunks[0].begin_pos[t], 0);
        assert_eq!(plan.chunks[0].first_record_index[t], 0);
        for pair in plan.chunks.windows(2) {
            assert_eq!(pair[0].end_pos[t], pair[1].begin_pos[t]);
        }
    }
    assert_eq!(plan.chunks.last().unwrap().end_pos[0], root_size);
    assert_eq!(plan.chunks.last().unwrap().end_pos[1], secondary_size);

    // last root keys strictly increase; the first chunk has none
    assert!(plan.chunks[0].last_root_key.is_empty());
    for pair in plan.chunks.windows(2) {
        if !pair[0].last_root_key.is_empty() {
            assert!(pair[0].last_root_key < pair[1].last_root_key);
        }
    }

    // the cuts land on matching records: ten secondary records per root
    // record, with the fixture's fixed widths
    for chunk in &plan.chunks[1..] {
        let root_index = chunk.first_record_index[0];
        assert_eq!(chunk.first_record_index[1], 10 * root_index);
        assert_eq!(chunk.begin_pos[0], 9 * root_index);
        assert_eq!(chunk.begin_pos[1], 10 * 10 * root_index);
    }
}

#[test]
fn test_chunk_sizes_ramp_and_land() {
    let dir = tempfile::tempdir().unwrap();
    let (root, secondary) = two_table_fixture(&dir, 20_000);
    let tables = vec![
        TableSpec {
            path: root,
            key_fields: vec![0],
            used: true,
        },
        TableSpec {
            path: secondary,
            key_fields: vec![0],
            used: true,
        },
    ];
    let plan =
        compute_indexation(&tables, &config(2, Some(200_000)), &SilentProgress).unwrap();
    assert!(plan.len() >= 5);

    let totals: Vec<u64> = plan
        .chunks
        .iter()
        .map(|c| (0..2).map(|t| c.end_pos[t] - c.begin_pos[t]).sum())
        .collect();
    let peak = *totals.iter().max().unwrap();
    // head ramps up and tail shrinks: neither end carries the peak
    assert!(totals[0] < peak);
    assert!(*totals.last().unwrap() < peak);
}

#[test]
fn test_unused_table_is_never_opened() {
    let dir = tempfile::tempdir().unwrap();
    let (root, secondary) = two_table_fixture(&dir, 2_000);
    let tables = vec![
        TableSpec {
            path: root,
            key_fields: vec![0],
            used: true,
        },
        TableSpec {
            path: dir.path().join("does-not-exist.txt"),
            key_fields: vec![0],
            used: false,
        },
        TableSpec {
            path: secondary,
            key_fields: vec![0],
            used: true,
        },
    ];
    let plan =
        compute_indexation(&tables, &config(2, Some(40_000)), &SilentProgress).unwrap();
    for chunk in &plan.chunks {
        assert_eq!(chunk.begin_pos[1], 0);
        assert_eq!(chunk.end_pos[1], 0);
        assert_eq!(chunk.first_record_index[1], 0);
    }
}

#[test]
fn test_single_table_without_key() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("flat.txt");
    let mut f = std::io::BufWriter::new(std::fs::File::create(&root).unwrap());
    for i in 0..20_000u64 {
        writeln!(f, "row{:06};x", i).unwrap();
    }
    f.into_inner().unwrap();
    let size = std::fs::metadata(&root).unwrap().len();

    let tables = vec![TableSpec {
        path: root,
        key_fields: Vec::new(),
        used: true,
    }];
    let plan =
        compute_indexation(&tables, &config(4, Some(30_000)), &SilentProgress).unwrap();
    assert!(plan.len() > 1);
    for chunk in &plan.chunks {
        // keyless plan: cuts on arbitrary record boundaries, no root keys
        assert!(chunk.last_root_key.is_empty());
    }
    for pair in plan.chunks.windows(2) {
        assert_eq!(pair[0].end_pos[0], pair[1].begin_pos[0]);
        assert!(pair[0].begin_pos[0] < pair[0].end_pos[0]);
    }
    assert_eq!(plan.chunks.last().unwrap().end_pos[0], size);
}

#[test]
fn test_small_input_gets_single_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let (root, secondary) = two_table_fixture(&dir, 100);
    let root_size = std::fs::metadata(&root).unwrap().len();
    let secondary_size = std::fs::metadata(&secondary).unwrap().len();
    let tables = vec![
        TableSpec {
            path: root,
            key_fields: vec![0],
            used: true,
        },
        TableSpec {
            path: secondary,
            key_fields: vec![0],
            used: true,
        },
    ];
    // no forced size: the whole family fits one process
    let plan = compute_indexation(&tables, &config(2, None), &SilentProgress).unwrap();
    assert_eq!(plan.len(), 1);
    let chunk = &plan.chunks[0];
    assert_eq!(chunk.begin_pos, vec![0, 0]);
    assert_eq!(chunk.end_pos, vec![root_size, secondary_size]);
    assert!(chunk.last_root_key.is_empty());
}

#[test]
fn test_unsorted_root_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("root.txt");
    let mut f = std::io::BufWriter::new(std::fs::File::create(&root).unwrap());
    for i in (1..=5_000u64).rev() {
        writeln!(f, "k{:05};a", i).unwrap();
    }
    f.into_inner().unwrap();

    let tables = vec![TableSpec {
        path: root,
        key_fields: vec![0],
        used: true,
    }];
    let err = compute_indexation(&tables, &config(2, Some(10_000)), &SilentProgress)
        .unwrap_err();
    assert!(matches!(err, crate::error::SortError::UnsortedRecord { .. }));
}
