use std::path::Path;

use crate::common;
use crate::error::{SortError, SortResult};
use crate::runtime::{ProgressSink, plan_ranges, run_ordered};
use crate::scan::{RecordCursor, align_to_record};

/// Checkpoints over a file: `offsets[i]` is a record start and
/// `line_indexes[i]` the number of records before it. Both begin with the
/// implicit `(0, 0)` entry.
#[derive(Debug, Default, Clone)]
pub struct FileIndex {
    pub offsets: Vec<u64>,
    pub line_indexes: Vec<u64>,
}

impl FileIndex {
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }
}

struct RangeIndex {
    pairs: Vec<(u64, u64)>,
    local_lines: u64,
}

/// Index `path` with one checkpoint roughly every
/// `buffer_size / positions_per_buffer` bytes. Workers scan disjoint aligned
/// ranges; the master concatenates in task order and accumulates line counts.
pub fn index_file(
    path: &Path,
    buffer_size: u64,
    positions_per_buffer: usize,
    progress: &dyn ProgressSink,
) -> SortResult<FileIndex> {
    let positions_per_buffer = positions_per_buffer.max(1);
    let mmap = common::open_scan(path)?;
    let data: &[u8] = &mmap;
    let file_size = data.len() as u64;

    progress.begin_task("Index file");
    let ranges = plan_ranges(file_size, buffer_size);
    let results = run_ordered(&ranges, |range| {
        if progress.is_interruption_requested() {
            return Err(SortError::Interrupted);
        }
        let begin = align_to_record(data, range.begin as usize);
        let end = range.end as usize;
        let span = range.end - range.begin;

        let mut cursor = RecordCursor::new(data, begin, end);
        let mut pairs: Vec<(u64, u64)> = Vec::with_capacity(positions_per_buffer);
        let mut lines = 0u64;
        let mut next_target = 0usize;
        let mut counter = 0u64;
        while let Some(record) = cursor.next_record() {
            lines += 1;
            counter += 1;
            if progress.is_refresh_necessary(counter) && progress.is_interruption_requested() {
                return Err(SortError::Interrupted);
            }
            while next_target < positions_per_buffer {
                let target =
                    range.begin + span * (next_target as u64 + 1) / positions_per_buffer as u64;
                if (record.next as u64) < target {
                    break;
                }
                if pairs.last().map(|&(off, _)| off) != Some(record.next as u64) {
                    pairs.push((record.next as u64, lines));
                }
                next_target += 1;
            }
        }
        // every range reports at least its end boundary
        if pairs.is_empty() && lines > 0 {
            pairs.push((cursor.position() as u64, lines));
        }
        Ok(RangeIndex {
            pairs,
            local_lines: lines,
        })
    });
    progress.end_task();
    let results = results?;

    let mut index = FileIndex {
        offsets: vec![0],
        line_indexes: vec![0],
    };
    let mut cumulated = 0u64;
    for range_index in &results {
        for &(offset, local_line) in &range_index.pairs {
            if index.offsets.last() == Some(&offset) {
                continue;
            }
            index.offsets.push(offset);
            index.line_indexes.push(cumulated + local_line);
        }
        cumulated += range_index.local_lines;
    }
    Ok(index)
}
