use std::path::Path;

use crate::common;
use crate::error::{SortError, SortResult};
use crate::key::{Key, KeyExtractor};
use crate::runtime::resource::DEFAULT_BUFFER_SIZE;
use crate::runtime::{ProgressSink, plan_ranges, run_ordered};
use crate::sampler::KeyPosition;
use crate::scan::{RecordCursor, align_to_record, count_records};

struct Probe {
    key: Key,
    line_index: u64,
}

struct RangeFind {
    emitted: Vec<KeyPosition>,
    first: Option<Probe>,
    last: Option<Probe>,
    lines: u64,
}

/// Index of the first element of the run of the greatest target strictly
/// below `key`; when every target is >= `key`, the first target.
fn run_start_below(targets: &[Key], key: &Key) -> usize {
    let below = targets.partition_point(|t| t < key);
    if below == 0 {
        return 0;
    }
    let greatest = &targets[below - 1];
    targets.partition_point(|t| t < greatest)
}

fn scan_range(
    data: &[u8],
    begin: u64,
    end: u64,
    targets: &[Key],
    extractor: &KeyExtractor,
    header: bool,
    progress: &dyn ProgressSink,
) -> SortResult<RangeFind> {
    let aligned = align_to_record(data, begin as usize);
    let mut cursor = RecordCursor::new(data, aligned, end as usize);
    let mut out = RangeFind {
        emitted: Vec::new(),
        first: None,
        last: None,
        lines: 0,
    };
    let mut target_index: Option<usize> = None;
    let mut previous_key: Option<Key> = None;
    let mut counter = 0u64;

    while let Some(record) = cursor.next_record() {
        counter += 1;
        if progress.is_refresh_necessary(counter) && progress.is_interruption_requested() {
            return Err(SortError::Interrupted);
        }
        if header && record.start == 0 {
            continue;
        }
        if record.is_too_long() {
            out.lines += 1;
            continue;
        }
        let parsed = extractor.extract(record.content());
        let key = parsed.key;

        if out.first.is_none() {
            out.first = Some(Probe {
                key: key.clone(),
                line_index: out.lines,
            });
        }

        let changed = match &previous_key {
            None => true,
            Some(prev) => {
                if key < *prev {
                    return Err(SortError::UnsortedRecord {
                        line_index: out.lines,
                        key: key.label(),
                        previous_key: prev.label(),
                    });
                }
                key > *prev
            }
        };

        if changed {
            let mut cursor_index = match target_index {
                Some(i) => i,
                None => run_start_below(targets, &key),
            };
            while cursor_index < targets.len() && targets[cursor_index] < key {
                out.emitted.push(KeyPosition {
                    key: targets[cursor_index].clone(),
                    line_index: out.lines,
                    line_position: record.start as u64,
                });
                cursor_index += 1;
            }
            target_index = Some(cursor_index);
            if cursor_index >= targets.len() {
                // every remaining target is covered; only the line count of
                // the rest of the range is still needed
                out.last = Some(Probe {
                    key: key.clone(),
                    line_index: out.lines,
                });
                out.lines += 1;
                out.lines += count_records(data, cursor.position(), end as usize);
                return Ok(out);
            }
        }

        out.last = Some(Probe {
            key: key.clone(),
            line_index: out.lines,
        });
        previous_key = Some(key);
        out.lines += 1;
    }
    Ok(out)
}

/// For each target key of the sorted slice `targets`, return the position
/// just past the last record of the sorted file whose key is <= the target:
/// `(target, line_index, line_position)` where `line_index` counts the
/// records before the position. Targets beyond every record map to
/// `(total_lines, file_size)`; duplicate targets map to identical positions.
pub fn find_key_positions(
    path: &Path,
    extractor: &KeyExtractor,
    header: bool,
    targets: &[Key],
    progress: &dyn ProgressSink,
) -> SortResult<Vec<KeyPosition>> {
    find_key_positions_buffered(path, extractor, header, targets, DEFAULT_BUFFER_SIZE, progress)
}

pub(crate) fn find_key_positions_buffered(
    path: &Path,
    extractor: &KeyExtractor,
    header: bool,
    targets: &[Key],
    buffer_size: u64,
    progress: &dyn ProgressSink,
) -> SortResult<Vec<KeyPosition>> {
    debug_assert!(targets.windows(2).all(|w| w[0] <= w[1]));

    let mmap = common::open_scan(path)?;
    let data: &[u8] = &mmap;
    let file_size = data.len() as u64;

    progress.begin_task("Find key positions");
    let ranges = plan_ranges(file_size, buffer_size);
    let results = run_ordered(&ranges, |range| {
        scan_range(data, range.begin, range.end, targets, extractor, header, progress)
    });
    progress.end_task();
    let results = results?;

    // cross-worker order check on the boundary probes
    for pair in results.windows(2) {
        if let (Some(last), Some(first)) = (&pair[0].last, &pair[1].first) {
            if last.key > first.key {
                return Err(SortError::UnsortedRecord {
                    line_index: first.line_index,
                    key: first.key.label(),
                    previous_key: last.key.label(),
                });
            }
        }
    }

    // concatenate in task order; runs of equal targets found by two adjacent
    // workers keep the earlier positions (the later copies start past records
    // that may still carry keys <= target)
    let mut collected: Vec<KeyPosition> = Vec::new();
    let mut total_lines = 0u64;
    for task in results {
        let mut entries = task.emitted;
        for entry in entries.iter_mut() {
            entry.line_index += total_lines;
        }
        let mut skip = 0usize;
        if let (Some(last), Some(first)) = (collected.last(), entries.first()) {
            if first.key < last.key {
                return Err(SortError::UnsortedRecord {
                    line_index: first.line_index,
                    key: first.key.label(),
                    previous_key: last.key.label(),
                });
            }
            if first.key == last.key {
                skip = entries
                    .iter()
                    .take_while(|e| e.key == first.key)
                    .count();
            }
        }
        collected.extend(entries.into_iter().skip(skip));
        total_lines += task.lines;
    }

    // gap filling: targets that fell between two workers' key ranges take the
    // next collected position; targets beyond every record take end of file
    let mut out: Vec<KeyPosition> = Vec::with_capacity(targets.len());
    let mut next = 0usize;
    for target in targets {
        if next == collected.len() {
            out.push(KeyPosition {
                key: target.clone(),
                line_index: total_lines,
                line_position: file_size,
            });
        } else if collected[next].key == *target {
            out.push(collected[next].clone());
            next += 1;
        } else {
            debug_assert!(*target < collected[next].key);
            out.push(KeyPosition {
                key: target.clone(),
                line_index: collected[next].line_index,
                line_position: collected[next].line_position,
            });
        }
    }
    debug_assert_eq!(out.len(), targets.len());
    Ok(out)
}
