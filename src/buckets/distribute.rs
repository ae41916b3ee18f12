use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::common;
use crate::error::{SortError, SortResult};
use crate::key::{KeyExtractor, RecordStatus};
use crate::runtime::resource::MIN_DISTRIBUTOR_MEMORY;
use crate::runtime::scheduler::plan_blocks;
use crate::runtime::{ProgressSink, run_ordered};
use crate::scan::{RecordCursor, ScanStats, align_to_record};

use super::BucketSet;

#[derive(Debug, Clone)]
pub struct DistributeSpec {
    pub worker_count: usize,
    /// Budget for one worker's in-memory bucket buffers.
    pub per_worker_memory: u64,
    pub tmp_dir: PathBuf,
    pub header: bool,
    /// Distinguishes spill files across passes of the same job.
    pub file_prefix: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DistributeOutcome {
    pub total_lines: u64,
    pub stats: ScanStats,
}

struct WorkerReport {
    /// (bucket index, spill file, bytes) for every non-empty bucket.
    files: Vec<(usize, PathBuf, u64)>,
    lines: u64,
    stats: ScanStats,
}

fn spill_path(spec: &DistributeSpec, bucket_id: usize, worker: usize) -> PathBuf {
    spec.tmp_dir
        .join(format!("{}bucket_{}_task{}.txt", spec.file_prefix, bucket_id, worker))
}

/// Append `buffer` to the worker's spill file for `bucket_id`, creating it on
/// first use.
fn spill(
    spec: &DistributeSpec,
    bucket_id: usize,
    worker: usize,
    buffer: &[u8],
    created: &mut bool,
) -> SortResult<()> {
    let path = spill_path(spec, bucket_id, worker);
    let mut file = if *created {
        OpenOptions::new().append(true).open(&path)?
    } else {
        *created = true;
        OpenOptions::new().create(true).write(true).truncate(true).open(&path)?
    };
    file.write_all(buffer)?;
    Ok(())
}

/// Route every record of `path` to the bucket owning its key, spilling the
/// largest buckets whenever a worker's buffers exceed its budget. On return
/// each bucket carries its spill files in worker order; the files are not
/// concatenated here.
pub fn distribute(
    path: &Path,
    extractor: &KeyExtractor,
    buckets: &mut BucketSet,
    spec: &DistributeSpec,
    progress: &dyn ProgressSink,
) -> SortResult<DistributeOutcome> {
    if spec.per_worker_memory < MIN_DISTRIBUTOR_MEMORY {
        return Err(SortError::InsufficientMemory(format!(
            "bucket distribution needs at least {} bytes per worker, granted {}",
            MIN_DISTRIBUTOR_MEMORY, spec.per_worker_memory
        )));
    }

    let mmap = common::open_scan(path)?;
    let data: &[u8] = &mmap;
    let file_size = data.len() as u64;
    let bucket_count = buckets.len();

    progress.begin_task("Distribute records to buckets");
    let blocks = plan_blocks(file_size, spec.worker_count.max(1));
    let shared: &BucketSet = buckets;
    let results = run_ordered(&blocks, |block| {
        let worker = block.index;
        let outcome = distribute_block(
            data,
            block.begin,
            block.end,
            extractor,
            shared,
            spec,
            worker,
            progress,
        );
        if outcome.is_err() {
            // a failed or interrupted worker leaves no partial spill files
            for bucket_id in 0..bucket_count {
                common::remove_file_quiet(&spill_path(spec, bucket_id, worker));
            }
        }
        outcome
    });
    progress.end_task();

    let results = match results {
        Ok(results) => results,
        Err(err) => {
            // completed workers' files are unreachable through the result
            // channel; their names are deterministic, sweep them all
            for worker in 0..blocks.len() {
                for bucket_id in 0..bucket_count {
                    common::remove_file_quiet(&spill_path(spec, bucket_id, worker));
                }
            }
            return Err(err);
        }
    };

    let mut outcome = DistributeOutcome::default();
    for report in results {
        outcome.total_lines += report.lines;
        outcome.stats.merge(&report.stats);
        for (bucket_id, file, size) in report.files {
            let bucket = buckets.get_mut(bucket_id);
            bucket.chunk_files.push(file);
            bucket.size_bytes += size;
        }
    }
    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
fn distribute_block(
    data: &[u8],
    begin: u64,
    end: u64,
    extractor: &KeyExtractor,
    buckets: &BucketSet,
    spec: &DistributeSpec,
    worker: usize,
    progress: &dyn ProgressSink,
) -> SortResult<WorkerReport> {
    let bucket_count = buckets.len();
    let mut buffers: Vec<Vec<u8>> = vec![Vec::new(); bucket_count];
    let mut created: Vec<bool> = vec![false; bucket_count];
    let mut spilled: Vec<u64> = vec![0; bucket_count];
    let mut used_memory = 0u64;
    let mut report = WorkerReport {
        files: Vec::new(),
        lines: 0,
        stats: ScanStats::default(),
    };

    let aligned = align_to_record(data, begin as usize);
    let mut cursor = RecordCursor::new(data, aligned, end as usize);
    let mut counter = 0u64;
    while let Some(record) = cursor.next_record() {
        counter += 1;
        if progress.is_refresh_necessary(counter) {
            progress.display_progression(
                100 * (cursor.position() as u64 - begin) / (end - begin).max(1),
            );
            if progress.is_interruption_requested() {
                return Err(SortError::Interrupted);
            }
        }
        if spec.header && record.start == 0 {
            continue;
        }
        report.lines += 1;
        if record.is_too_long() {
            report.stats.long_lines += 1;
            continue;
        }

        let parsed = extractor.extract(record.content());
        if parsed.status == RecordStatus::ShortLine {
            report.stats.short_lines += 1;
        }
        if parsed.open_quote {
            report.stats.encoding_errors += 1;
        }

        let index = buckets.bucket_index_for(&parsed.key);
        let raw = record.raw(data);
        let buffer = &mut buffers[index];
        buffer.extend_from_slice(raw);
        used_memory += raw.len() as u64;
        if raw.last() != Some(&b'\n') {
            // last record of the file without a terminator
            buffer.push(b'\n');
            used_memory += 1;
        }

        // over budget: flush the biggest buckets until usage halves, but
        // only buckets above the mean, so many small buckets survive
        if used_memory > spec.per_worker_memory {
            let mean = used_memory / bucket_count.max(1) as u64;
            let mut order: Vec<usize> = (0..bucket_count).collect();
            order.sort_by_key(|&i| std::cmp::Reverse(buffers[i].len()));
            for i in order {
                if used_memory <= spec.per_worker_memory / 2 {
                    break;
                }
                let len = buffers[i].len() as u64;
                if len > mean {
                    let buffer = std::mem::take(&mut buffers[i]);
                    spill(spec, i, worker, &buffer, &mut created[i])?;
                    spilled[i] += len;
                    used_memory -= len;
                }
            }
        }
    }

    // final flush of every pending bucket
    for i in 0..bucket_count {
        if !buffers[i].is_empty() {
            let buffer = std::mem::take(&mut buffers[i]);
            spilled[i] += buffer.len() as u64;
            spill(spec, i, worker, &buffer, &mut created[i])?;
        }
        if created[i] {
            report
                .files
                .push((i, spill_path(spec, i, worker), spilled[i]));
        }
    }
    Ok(report)
}
