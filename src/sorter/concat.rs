use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memchr::{memchr, memrchr};

use crate::common;
use crate::error::{SortError, SortResult};

/// 4MB buffer for the output file.
const OUTPUT_BUF_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Default, Clone, Copy)]
pub struct ConcatOutcome {
    pub lines_written: u64,
    /// Boundary lines dropped because they repeated the previous file's last
    /// line; the written-record count excludes them.
    pub duplicates_skipped: u64,
}

/// Append `sources` byte-for-byte to `dest` (no ordering assumptions); used
/// to rebuild a single source file for an overweight bucket.
pub fn concat_files(sources: &[PathBuf], dest: &Path) -> SortResult<()> {
    let file = File::create(dest)?;
    let mut writer = BufWriter::with_capacity(OUTPUT_BUF_SIZE, file);
    for source in sources {
        let data = common::read_file_bytes(source)?;
        writer.write_all(&data)?;
    }
    writer.flush()?;
    Ok(())
}

fn last_line(data: &[u8]) -> &[u8] {
    let trimmed = match data.last() {
        Some(b'\n') => &data[..data.len() - 1],
        _ => data,
    };
    match memrchr(b'\n', trimmed) {
        Some(pos) => &trimmed[pos + 1..],
        None => trimmed,
    }
}

/// Concatenate sorted files in order, checking the boundary between every
/// pair: the next file's first line must not sort below the previous file's
/// last line (that is an ordering error); an equal line is a duplicate and is
/// written only once.
pub fn concat_sorted_files(
    sources: &[PathBuf],
    writer: &mut impl Write,
) -> SortResult<ConcatOutcome> {
    let mut outcome = ConcatOutcome::default();
    let mut previous_last: Option<Vec<u8>> = None;

    for source in sources {
        let data = common::read_file_bytes(source)?;
        if data.is_empty() {
            continue;
        }
        let first_end = memchr(b'\n', &data).unwrap_or(data.len());
        let mut start = 0usize;
        if let Some(prev) = &previous_last {
            match data[..first_end].cmp(prev.as_slice()) {
                std::cmp::Ordering::Less => {
                    return Err(SortError::UnsortedRecord {
                        line_index: outcome.lines_written,
                        key: String::from_utf8_lossy(&data[..first_end]).into_owned(),
                        previous_key: String::from_utf8_lossy(prev).into_owned(),
                    });
                }
                std::cmp::Ordering::Equal => {
                    start = (first_end + 1).min(data.len());
                    outcome.duplicates_skipped += 1;
                }
                std::cmp::Ordering::Greater => {}
            }
        }
        if start < data.len() {
            writer.write_all(&data[start..])?;
            outcome.lines_written +=
                memchr::memchr_iter(b'\n', &data[start..]).count() as u64;
            if data.last() != Some(&b'\n') {
                writer.write_all(b"\n")?;
                outcome.lines_written += 1;
            }
        }
        previous_last = Some(last_line(&data).to_vec());
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_concat_ordered_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = file(&dir, "a.txt", b"a\nb\n");
        let b = file(&dir, "b.txt", b"c\nd\n");
        let mut out = Vec::new();
        let outcome = concat_sorted_files(&[a, b], &mut out).unwrap();
        assert_eq!(out, b"a\nb\nc\nd\n");
        assert_eq!(outcome.lines_written, 4);
        assert_eq!(outcome.duplicates_skipped, 0);
    }

    #[test]
    fn test_concat_skips_boundary_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let a = file(&dir, "a.txt", b"a\nb\n");
        let b = file(&dir, "b.txt", b"b\nc\n");
        let mut out = Vec::new();
        let outcome = concat_sorted_files(&[a, b], &mut out).unwrap();
        assert_eq!(out, b"a\nb\nc\n");
        assert_eq!(outcome.lines_written, 3);
        assert_eq!(outcome.duplicates_skipped, 1);
    }

    #[test]
    fn test_concat_rejects_backwards_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let a = file(&dir, "a.txt", b"b\nz\n");
        let b = file(&dir, "b.txt", b"a\n");
        let mut out = Vec::new();
        let err = concat_sorted_files(&[a, b], &mut out).unwrap_err();
        assert!(matches!(err, SortError::UnsortedRecord { .. }));
    }

    #[test]
    fn test_concat_skips_empty_sources() {
        let dir = tempfile::tempdir().unwrap();
        let a = file(&dir, "a.txt", b"a\n");
        let empty = file(&dir, "e.txt", b"");
        let b = file(&dir, "b.txt", b"b\n");
        let mut out = Vec::new();
        let outcome = concat_sorted_files(&[a, empty, b], &mut out).unwrap();
        assert_eq!(out, b"a\nb\n");
        assert_eq!(outcome.lines_written, 2);
    }

    #[test]
    fn test_concat_restores_final_newline() {
        let dir = tempfile::tempdir().unwrap();
        let a = file(&dir, "a.txt", b"a\nb");
        let mut out = Vec::new();
        let outcome = concat_sorted_files(&[a], &mut out).unwrap();
        assert_eq!(out, b"a\nb\n");
        assert_eq!(outcome.lines_written, 2);
    }

    #[test]
    fn test_concat_files_raw() {
        let dir = tempfile::tempdir().unwrap();
        let a = file(&dir, "a.txt", b"2\n1\n");
        let b = file(&dir, "b.txt", b"9\n0\n");
        let dest = dir.path().join("out.txt");
        concat_files(&[a, b], &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), b"2\n1\n9\n0\n");
    }
}
