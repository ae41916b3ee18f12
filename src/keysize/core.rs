use std::path::Path;

use crate::common;
use crate::error::{SortError, SortResult};
use crate::key::KeyExtractor;
use crate::runtime::resource::DEFAULT_BUFFER_SIZE;
use crate::runtime::{ProgressSink, ith_random_double, run_ordered};
use crate::scan::{RecordCursor, align_to_record};

/// Estimated key footprint and line count for a file, from randomized
/// disjoint buffer samples. Both estimates are deliberately rounded up; they
/// feed memory budgets where underestimating is the only real danger.
#[derive(Debug, Clone, Copy)]
pub struct KeySizeEstimate {
    pub mean_key_bytes: u64,
    pub total_lines: u64,
}

struct BufferSample {
    key_bytes: u64,
    lines: u64,
    effective_bytes: u64,
}

/// Sample `max(3, worker_count)` buffers at sorted random offsets and derive
/// the mean composite-key size and an estimated total line count.
pub fn evaluate_key_size(
    path: &Path,
    extractor: &KeyExtractor,
    header: bool,
    worker_count: usize,
    progress: &dyn ProgressSink,
) -> SortResult<KeySizeEstimate> {
    let mmap = common::open_scan(path)?;
    let data: &[u8] = &mmap;
    let file_size = data.len() as u64;

    progress.begin_task("Evaluate key size");

    // Random disjoint buffer offsets: draw in the shrunk domain, sort, then
    // shift each draw by its rank so buffers cannot overlap. The buffer
    // shrinks on small files so the draws stay disjoint.
    let wanted = worker_count.max(3) as u64;
    let buffer_size = DEFAULT_BUFFER_SIZE
        .min((file_size / wanted).max(64 * 1024))
        .min(file_size.max(1));
    let buffer_count = (file_size / buffer_size).min(wanted).max(1);
    let domain = file_size.saturating_sub(buffer_count * buffer_size);
    let mut offsets: Vec<u64> = (0..buffer_count)
        .map(|i| (ith_random_double(i) * domain as f64) as u64)
        .collect();
    offsets.sort_unstable();
    for (rank, offset) in offsets.iter_mut().enumerate() {
        *offset += rank as u64 * buffer_size;
    }

    let results = run_ordered(&offsets, |&offset| {
        if progress.is_interruption_requested() {
            return Err(SortError::Interrupted);
        }
        let begin = align_to_record(data, offset as usize);
        let end = ((offset + buffer_size) as usize).min(data.len());
        let mut cursor = RecordCursor::new(data, begin, end);
        let mut sample = BufferSample {
            key_bytes: 0,
            lines: 0,
            effective_bytes: 0,
        };
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
                continue;
            }
            let parsed = extractor.extract(record.content());
            sample.key_bytes += parsed.key.used_memory();
            sample.lines += 1;
        }
        sample.effective_bytes = (cursor.position() - begin) as u64;
        Ok(sample)
    });
    progress.end_task();
    let results = results?;

    let key_bytes: u64 = results.iter().map(|s| s.key_bytes).sum();
    let lines: u64 = results.iter().map(|s| s.lines).sum();
    let effective: u64 = results.iter().map(|s| s.effective_bytes).sum();

    let mean_key_bytes = 1 + key_bytes.div_ceil(lines + 1);
    let total_lines = 1 + (lines as f64 * file_size as f64 / (effective + 1) as f64).ceil() as u64;
    Ok(KeySizeEstimate {
        mean_key_bytes,
        total_lines,
    })
}
