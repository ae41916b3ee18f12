use std::collections::BinaryHeap;
use std::mem;
use std::path::Path;

use crate::common;
use crate::error::{SortError, SortResult};
use crate::key::{Key, KeyExtractor};
use crate::runtime::resource::sampler_buffer_size;
use crate::runtime::{ProgressSink, ith_random_double, plan_ranges, run_ordered};
use crate::scan::{RecordCursor, align_to_record};

/// A sampled key with the 1-based index of the record it came from and the
/// byte offset of the record *following* it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPosition {
    pub key: Key,
    pub line_index: u64,
    pub line_position: u64,
}

impl KeyPosition {
    pub fn used_memory(&self) -> u64 {
        self.key.used_memory() + mem::size_of::<KeyPosition>() as u64
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SampleSpec {
    /// Target number of sampled keys.
    pub sample_size: u64,
    /// From the key-size evaluator.
    pub mean_key_bytes: u64,
    /// From the key-size evaluator.
    pub total_lines: u64,
    /// Master-side budget for the accumulated sample.
    pub max_memory: u64,
    pub worker_count: usize,
    pub header: bool,
}

struct TaskSample {
    /// Sampling rate the entries currently reflect.
    rate: f64,
    entries: Vec<KeyPosition>,
    used_memory: u64,
    lines: u64,
    bytes: u64,
}

/// Rejection-resample `task` down by `ratio`, keyed on a counter seeded with
/// the task's stored index so retries reproduce the same survivors. Returns
/// the freed memory.
fn resample(task: &mut TaskSample, ratio: f64, seed: u64) -> u64 {
    if ratio >= 1.0 {
        return 0;
    }
    let mut removed = 0u64;
    let mut counter = seed;
    task.entries.retain(|entry| {
        let keep = ith_random_double(counter) <= ratio;
        counter += 1;
        if !keep {
            removed += entry.used_memory();
        }
        keep
    });
    task.used_memory -= removed;
    task.rate *= ratio;
    removed
}

fn scan_range(
    data: &[u8],
    begin: u64,
    end: u64,
    extractor: &KeyExtractor,
    header: bool,
    rate: f64,
    require_sorted: bool,
    progress: &dyn ProgressSink,
) -> SortResult<TaskSample> {
    let aligned = align_to_record(data, begin as usize);
    let mut cursor = RecordCursor::new(data, aligned, end as usize);
    let mut task = TaskSample {
        rate,
        entries: Vec::new(),
        used_memory: 0,
        lines: 0,
        bytes: 0,
    };
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
        task.lines += 1;
        if record.is_too_long() {
            continue;
        }

        let sampled = ith_random_double(record.next as u64) <= rate;
        if !sampled && !require_sorted {
            continue;
        }
        let parsed = extractor.extract(record.content());
        if require_sorted {
            if let Some(prev) = &previous_key {
                if parsed.key < *prev {
                    return Err(SortError::UnsortedRecord {
                        line_index: task.lines,
                        key: parsed.key.label(),
                        previous_key: prev.label(),
                    });
                }
            }
        }
        if sampled {
            let entry = KeyPosition {
                line_index: task.lines,
                line_position: record.next as u64,
                key: parsed.key.clone(),
            };
            task.used_memory += entry.used_memory();
            task.entries.push(entry);
        }
        if require_sorted {
            previous_key = Some(parsed.key);
        }
    }
    task.bytes = (cursor.position() - aligned) as u64;

    if !require_sorted {
        task.entries
            .sort_by(|a, b| a.key.cmp(&b.key).then(a.line_position.cmp(&b.line_position)));
    }
    // equal adjacent keys collapse to the first occurrence
    if require_sorted {
        let mut deduped: Vec<KeyPosition> = Vec::with_capacity(task.entries.len());
        for entry in task.entries.drain(..) {
            match deduped.last() {
                Some(last) if last.key == entry.key => {
                    task.used_memory -= entry.used_memory();
                }
                _ => deduped.push(entry),
            }
        }
        task.entries = deduped;
    }
    Ok(task)
}

/// Shared master loop: schedule ranges in waves of `worker_count`, track the
/// sample's memory, and shrink the rate (re-subsampling everything already
/// stored) whenever the budget is exceeded.
fn run_sampling(
    path: &Path,
    extractor: &KeyExtractor,
    spec: &SampleSpec,
    require_sorted: bool,
    buffer_override: Option<u64>,
    progress: &dyn ProgressSink,
) -> SortResult<Vec<TaskSample>> {
    let mmap = common::open_scan(path)?;
    let data: &[u8] = &mmap;
    let file_size = data.len() as u64;

    let buffer = buffer_override.unwrap_or_else(|| {
        sampler_buffer_size(
            spec.max_memory,
            spec.mean_key_bytes,
            spec.total_lines,
            file_size,
            spec.worker_count,
        )
    });
    let ranges = plan_ranges(file_size, buffer);

    let mut rate = (spec.sample_size as f64 / spec.total_lines.max(1) as f64).clamp(0.0, 1.0);
    if rate == 0.0 {
        rate = 1.0f64.min(1.0 / spec.total_lines.max(1) as f64);
    }

    let mut samples: Vec<TaskSample> = Vec::with_capacity(ranges.len());
    let mut current_memory = 0u64;
    let mut cumulated_bytes = 0u64;

    for wave in ranges.chunks(spec.worker_count.max(1)) {
        if progress.is_interruption_requested() {
            return Err(SortError::Interrupted);
        }
        let wave_rate = rate;
        let results = run_ordered(wave, |range| {
            scan_range(
                data,
                range.begin,
                range.end,
                extractor,
                spec.header,
                wave_rate,
                require_sorted,
                progress,
            )
        })?;

        for mut task in results {
            cumulated_bytes += task.bytes;

            // shrink the rate before integrating a sample that would not fit
            let new_used = current_memory + task.used_memory;
            if new_used > spec.max_memory {
                let progress_share = cumulated_bytes as f64 / file_size.max(1) as f64;
                let new_rate =
                    rate * progress_share * 0.9 * spec.max_memory as f64 / new_used as f64;
                if new_rate < rate {
                    for (stored_index, stored) in samples.iter_mut().enumerate() {
                        current_memory -= resample(stored, new_rate / stored.rate, stored_index as u64);
                    }
                    rate = new_rate;
                }
            }

            // late result from a faster wave: align it with the current rate
            if (task.rate - rate).abs() > 1e-5 * rate {
                let resample_ratio = rate / task.rate;
                resample(&mut task, resample_ratio, samples.len() as u64);
            }
            current_memory += task.used_memory;
            samples.push(task);
        }
        progress.display_progression(100 * samples.len() as u64 / ranges.len().max(1) as u64);
    }
    Ok(samples)
}

/// Sample `(key, line, position)` triples from a *sorted* file. Fails with
/// `unsorted_record` on any local order violation. Output keys are strictly
/// increasing; on a boundary duplicate the later position wins (the sampled
/// position is the end of the keyed record, so the later one is still
/// correct for that key).
pub fn extract_key_position_sample(
    path: &Path,
    extractor: &KeyExtractor,
    spec: &SampleSpec,
    progress: &dyn ProgressSink,
) -> SortResult<Vec<KeyPosition>> {
    extract_key_position_sample_buffered(path, extractor, spec, None, progress)
}

pub(crate) fn extract_key_position_sample_buffered(
    path: &Path,
    extractor: &KeyExtractor,
    spec: &SampleSpec,
    buffer_override: Option<u64>,
    progress: &dyn ProgressSink,
) -> SortResult<Vec<KeyPosition>> {
    progress.begin_task("Extract key position sample");
    let samples = run_sampling(path, extractor, spec, true, buffer_override, progress)?;
    progress.end_task();

    let mut out: Vec<KeyPosition> = Vec::new();
    let mut cumulated_lines = 0u64;
    for task in samples {
        for mut entry in task.entries {
            entry.line_index += cumulated_lines;
            match out.last() {
                Some(last) if last.key == entry.key => {
                    // second occurrence wins: larger, still-correct position
                    out.pop();
                    out.push(entry);
                }
                Some(last) if entry.key < last.key => {
                    return Err(SortError::UnsortedRecord {
                        line_index: entry.line_index,
                        key: entry.key.label(),
                        previous_key: last.key.label(),
                    });
                }
                _ => out.push(entry),
            }
        }
        cumulated_lines += task.lines;
    }
    Ok(out)
}

/// Heap entry for the k-way merge of per-task sorted samples.
struct MergeHead {
    key: Key,
    source: usize,
}

impl PartialEq for MergeHead {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.source == other.source
    }
}
impl Eq for MergeHead {}
impl PartialOrd for MergeHead {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for MergeHead {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // reversed: BinaryHeap is a max-heap, we pop the smallest key
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// Sample keys from a file in *any* order (the sort driver's case). Each
/// worker sorts its own sample; the master merge-sorts the per-task streams
/// into one globally sorted key list, duplicates preserved.
pub fn extract_key_sample(
    path: &Path,
    extractor: &KeyExtractor,
    spec: &SampleSpec,
    progress: &dyn ProgressSink,
) -> SortResult<Vec<Key>> {
    extract_key_sample_buffered(path, extractor, spec, None, progress)
}

pub(crate) fn extract_key_sample_buffered(
    path: &Path,
    extractor: &KeyExtractor,
    spec: &SampleSpec,
    buffer_override: Option<u64>,
    progress: &dyn ProgressSink,
) -> SortResult<Vec<Key>> {
    progress.begin_task("Extract key sample");
    let samples = run_sampling(path, extractor, spec, false, buffer_override, progress)?;
    progress.end_task();

    let mut streams: Vec<std::vec::IntoIter<KeyPosition>> = samples
        .into_iter()
        .map(|task| task.entries.into_iter())
        .collect();
    let mut heap = BinaryHeap::with_capacity(streams.len());
    for (source, stream) in streams.iter_mut().enumerate() {
        if let Some(entry) = stream.next() {
            heap.push(MergeHead {
                key: entry.key,
                source,
            });
        }
    }
    let mut merged = Vec::new();
    while let Some(head) = heap.pop() {
        let source = head.source;
        merged.push(head.key);
        if let Some(entry) = streams[source].next() {
            heap.push(MergeHead {
                key: entry.key,
                source,
            });
        }
    }
    Ok(merged)
}
