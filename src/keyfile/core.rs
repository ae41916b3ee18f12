use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::common;
use crate::error::{SortError, SortResult};
use crate::key::{Key, KeyExtractor};
use crate::runtime::resource::DEFAULT_BUFFER_SIZE;
use crate::runtime::{ProgressSink, plan_ranges, run_ordered};
use crate::scan::{RecordCursor, align_to_record};
use crate::sorter::concat_sorted_files;

/// Serialize one key as a record: fields joined by `sep`, quoting any field
/// that embeds the separator or a quote (readable back by the same rules as
/// the input).
fn write_key_line(key: &Key, sep: u8, out: &mut Vec<u8>) {
    for (i, field) in key.fields().iter().enumerate() {
        if i > 0 {
            out.push(sep);
        }
        let needs_quoting = field.contains(&sep) || field.contains(&b'"');
        if needs_quoting {
            out.push(b'"');
            for &b in field {
                out.push(b);
                if b == b'"' {
                    out.push(b'"');
                }
            }
            out.push(b'"');
        } else {
            out.extend_from_slice(field);
        }
    }
    out.push(b'\n');
}

fn task_file(tmp_dir: &Path, stem: &str, task: usize) -> PathBuf {
    tmp_dir.join(format!("{}_keys_task{}.txt", stem, task))
}

/// Extract the distinct keys of the sorted file `input` into `output`, one
/// key per line with `out_sep` between components. Workers write per-range
/// key files which are concatenated with boundary de-duplication; a
/// duplicate skipped at a boundary is not counted. Returns the number of
/// keys written.
pub fn extract_keys_to_file(
    input: &Path,
    extractor: &KeyExtractor,
    header: bool,
    output: &Path,
    out_sep: u8,
    tmp_dir: &Path,
    progress: &dyn ProgressSink,
) -> SortResult<u64> {
    let mmap = common::open_scan(input)?;
    let data: &[u8] = &mmap;
    let file_size = data.len() as u64;
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "keys".to_string());

    progress.begin_task("Extract keys");
    let ranges = plan_ranges(file_size, DEFAULT_BUFFER_SIZE);
    let results = run_ordered(&ranges, |range| {
        let path = task_file(tmp_dir, &stem, range.index);
        let outcome = extract_range(
            data,
            range.begin,
            range.end,
            extractor,
            header,
            out_sep,
            &path,
            progress,
        );
        if outcome.is_err() {
            common::remove_file_quiet(&path);
        }
        outcome
    });
    progress.end_task();

    let task_files = match results {
        Ok(files) => files,
        Err(err) => {
            for range in &ranges {
                common::remove_file_quiet(&task_file(tmp_dir, &stem, range.index));
            }
            return Err(err);
        }
    };

    let result = (|| -> SortResult<u64> {
        let file = File::create(output)?;
        let mut writer = BufWriter::with_capacity(4 * 1024 * 1024, file);
        let outcome = concat_sorted_files(&task_files, &mut writer)?;
        writer.flush()?;
        Ok(outcome.lines_written)
    })();

    for file in &task_files {
        common::remove_file_quiet(file);
    }
    if result.is_err() {
        common::remove_file_quiet(output);
    }
    result
}

#[allow(clippy::too_many_arguments)]
fn extract_range(
    data: &[u8],
    begin: u64,
    end: u64,
    extractor: &KeyExtractor,
    header: bool,
    out_sep: u8,
    path: &Path,
    progress: &dyn ProgressSink,
) -> SortResult<PathBuf> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let aligned = align_to_record(data, begin as usize);
    let mut cursor = RecordCursor::new(data, aligned, end as usize);
    let mut previous: Option<Key> = None;
    let mut line = Vec::new();
    let mut lines = 0u64;
    let mut counter = 0u64;
    while let Some(record) = cursor.next_record() {
        counter += 1;
        if progress.is_refresh_necessary(counter) && progress.is_interruption_requested() {
            return Err(SortError::Interrupted);
        }
        if header && record.start == 0 {
            continue;
        }
        lines += 1;
        if record.is_too_long() {
            continue;
        }
        let parsed = extractor.extract(record.content());
        match &previous {
            Some(prev) if parsed.key == *prev => continue,
            Some(prev) if parsed.key < *prev => {
                return Err(SortError::UnsortedRecord {
                    line_index: lines,
                    key: parsed.key.label(),
                    previous_key: prev.label(),
                });
            }
            _ => {}
        }
        line.clear();
        write_key_line(&parsed.key, out_sep, &mut line);
        writer.write_all(&line)?;
        previous = Some(parsed.key);
    }
    writer.flush()?;
    Ok(path.to_path_buf())
}
