use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::buckets::{Bucket, BucketSet, DistributeSpec, distribute};
use crate::chunks::{ChunkSortSpec, sort_chunks};
use crate::common;
use crate::error::{SortError, SortResult};
use crate::key::KeyExtractor;
use crate::keysize::evaluate_key_size;
use crate::runtime::ProgressSink;
use crate::runtime::resource::{
    IN_MEMORY_SORT_LIMIT, MIN_DISTRIBUTOR_MEMORY, compute_chunk_limits,
};
use crate::sampler::{SampleSpec, extract_key_sample};
use crate::scan::{ScanStats, translate_separators};
use crate::splitter::{choose_split_keys, required_sample_size};

use super::concat::{concat_files, concat_sorted_files};

/// Conservative fraction of the max chunk size targeted by the splitter, so
/// estimation error rarely produces an overweight bucket.
const CHUNK_TARGET_RATIO: f64 = 0.8;

/// Recursion backstop; each pass shrinks chunks geometrically so this depth
/// is unreachable on real data.
const MAX_SPLIT_ROUNDS: u32 = 64;

#[derive(Debug, Clone)]
pub struct SortConfig {
    /// Key column indices, in key order (0-based).
    pub key_fields: Vec<usize>,
    pub in_sep: u8,
    pub out_sep: u8,
    /// Input carries a header line (never sorted).
    pub header: bool,
    /// Write the header line to the output.
    pub output_header: bool,
    pub worker_count: usize,
    /// Total memory budget across workers.
    pub total_memory: u64,
    pub tmp_dir: Option<PathBuf>,
}

impl Default for SortConfig {
    fn default() -> Self {
        SortConfig {
            key_fields: vec![0],
            in_sep: b'\t',
            out_sep: b'\t',
            header: false,
            output_header: true,
            worker_count: 4,
            total_memory: 512 * 1024 * 1024,
            tmp_dir: None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SortSummary {
    /// Records in the output file, header excluded.
    pub sorted_records: u64,
    pub stats: ScanStats,
}

/// Forwards interruption and polling cadence but swallows labels; rounds
/// after the first run silent.
struct QuietProgress<'a> {
    inner: &'a dyn ProgressSink,
}

impl ProgressSink for QuietProgress<'_> {
    fn is_interruption_requested(&self) -> bool {
        self.inner.is_interruption_requested()
    }
    fn is_refresh_necessary(&self, counter: u64) -> bool {
        self.inner.is_refresh_necessary(counter)
    }
}

/// A bucket still too large for one in-memory sort, rebuilt into a single
/// source file and queued for another split pass.
struct PendingSplit {
    range: Bucket,
    source: PathBuf,
    owns_source: bool,
    header: bool,
}

/// Temp and output state of one sort job; everything it references is
/// deleted on every terminal path except the successful output.
struct JobState {
    final_buckets: Vec<Bucket>,
    pending: Vec<PendingSplit>,
    sorted_files: Vec<PathBuf>,
}

impl JobState {
    fn cleanup(&mut self) {
        for bucket in self.final_buckets.iter_mut() {
            if bucket.owns_files {
                for file in bucket.chunk_files.drain(..) {
                    common::remove_file_quiet(&file);
                }
            }
            if let Some(sorted) = bucket.sorted_file.take() {
                common::remove_file_quiet(&sorted);
            }
        }
        for pending in self.pending.drain(..) {
            if pending.owns_source {
                common::remove_file_quiet(&pending.source);
            }
        }
        for file in self.sorted_files.drain(..) {
            common::remove_file_quiet(&file);
        }
    }
}

pub struct SortDriver<'a> {
    config: SortConfig,
    progress: &'a dyn ProgressSink,
}

impl<'a> SortDriver<'a> {
    pub fn new(config: SortConfig, progress: &'a dyn ProgressSink) -> Self {
        SortDriver { config, progress }
    }

    /// Sort `input` into `output` by the configured key. On success the
    /// output holds exactly `sorted_records` records (plus the optional
    /// header); on failure the output file does not exist and no temp file
    /// remains.
    pub fn sort(&self, input: &Path, output: &Path) -> SortResult<SortSummary> {
        let mut state = JobState {
            final_buckets: Vec::new(),
            pending: Vec::new(),
            sorted_files: Vec::new(),
        };
        let result = self.sort_inner(input, output, &mut state);
        state.cleanup();
        if result.is_err() {
            common::remove_file_quiet(output);
        }
        result
    }

    fn sort_inner(
        &self,
        input: &Path,
        output: &Path,
        state: &mut JobState,
    ) -> SortResult<SortSummary> {
        let config = &self.config;
        let progress = self.progress;
        progress.display_main_label("Sort file");

        if !input.exists() {
            return Err(SortError::MissingInput(input.to_path_buf()));
        }
        let file_size = common::file_size(input)?;
        if file_size == 0 {
            return Err(SortError::EmptyInput(input.to_path_buf()));
        }

        let tmp_dir = common::resolve_tmp_dir(config.tmp_dir.as_deref());
        // the output directory must hold the sorted copy, the temp dir the
        // bucket chunk files; on separate mounts both need checking
        let output_dir = output.parent().filter(|p| !p.as_os_str().is_empty());
        let free = common::disk_free_space(output_dir.unwrap_or(Path::new(".")))?;
        if free < file_size {
            return Err(SortError::InsufficientDisk {
                dir: output_dir.unwrap_or(Path::new(".")).to_path_buf(),
                required: file_size - free,
            });
        }
        let free = common::disk_free_space(&tmp_dir)?;
        if free < file_size {
            return Err(SortError::InsufficientDisk {
                dir: tmp_dir,
                required: file_size - free,
            });
        }

        // reserve the output name before any work starts
        common::create_empty_file(output)?;

        let extractor = KeyExtractor::new(&config.key_fields, config.in_sep);
        let header_line = if config.header {
            Some(read_header_line(input)?)
        } else {
            None
        };

        let estimate =
            evaluate_key_size(input, &extractor, config.header, config.worker_count, progress)?;
        let worker_memory =
            (config.total_memory / config.worker_count.max(1) as u64).max(MIN_DISTRIBUTOR_MEMORY);
        let limits = compute_chunk_limits(
            file_size,
            estimate.total_lines,
            estimate.mean_key_bytes,
            worker_memory,
        );

        let mut summary = SortSummary::default();

        if file_size <= IN_MEMORY_SORT_LIMIT && file_size <= limits.max_chunk_size {
            // single-pass path: the whole file is one bucket
            let mut bucket = Bucket::whole_file();
            bucket.chunk_files.push(input.to_path_buf());
            bucket.size_bytes = file_size;
            bucket.owns_files = false;
            state.final_buckets.push(bucket);

            sort_chunks(
                &mut state.final_buckets,
                &extractor,
                &ChunkSortSpec {
                    in_sep: config.in_sep,
                    out_sep: config.out_sep,
                    max_chunk_size: limits.max_chunk_size.max(file_size),
                    tmp_dir: tmp_dir.clone(),
                    file_prefix: job_prefix(output),
                    skip_first_line: config.header,
                },
                progress,
            )?;
        } else {
            // split passes until every bucket fits in memory
            let mut round = 0u32;
            state.pending.push(PendingSplit {
                range: Bucket::whole_file(),
                source: input.to_path_buf(),
                owns_source: false,
                header: config.header,
            });
            while let Some(pending) = state.pending.pop() {
                round += 1;
                if round > MAX_SPLIT_ROUNDS {
                    return Err(SortError::InsufficientMemory(
                        "chunk splitting did not converge".to_string(),
                    ));
                }
                let quiet = QuietProgress { inner: progress };
                let round_progress: &dyn ProgressSink =
                    if round == 1 { progress } else { &quiet };
                let stats = self.split_pass(
                    pending,
                    &extractor,
                    &tmp_dir,
                    limits.min_chunk_size,
                    limits.max_chunk_size,
                    round,
                    state,
                    round_progress,
                )?;
                summary.stats.merge(&stats);
            }

            // buckets are id-ordered within a pass but passes interleave;
            // restore global key order before concatenation
            state.final_buckets.sort_by(|a, b| {
                let lower = |x: &Bucket| (x.lower.clone(), x.lower_exclusive);
                lower(a).cmp(&lower(b))
            });
            for (index, bucket) in state.final_buckets.iter_mut().enumerate() {
                bucket.id = index;
            }

            sort_chunks(
                &mut state.final_buckets,
                &extractor,
                &ChunkSortSpec {
                    in_sep: config.in_sep,
                    out_sep: config.out_sep,
                    max_chunk_size: limits.max_chunk_size,
                    tmp_dir: tmp_dir.clone(),
                    file_prefix: job_prefix(output),
                    skip_first_line: false,
                },
                progress,
            )?;
        }

        // concatenate sorted buckets into the reserved output
        state.sorted_files = state
            .final_buckets
            .iter_mut()
            .filter_map(|b| b.sorted_file.take())
            .collect();
        let file = File::create(output)?;
        let mut writer = BufWriter::with_capacity(4 * 1024 * 1024, file);
        if config.output_header {
            if let Some(header) = &header_line {
                let content = match header.last() {
                    Some(b'\n') => &header[..header.len() - 1],
                    _ => header.as_slice(),
                };
                let content = match content.last() {
                    Some(b'\r') => &content[..content.len() - 1],
                    _ => content,
                };
                let mut line = Vec::with_capacity(content.len() + 1);
                translate_separators(content, config.in_sep, config.out_sep, &mut line);
                line.push(b'\n');
                writer.write_all(&line)?;
            }
        }
        let outcome = concat_sorted_files(&state.sorted_files, &mut writer)?;
        writer.flush()?;
        summary.sorted_records = outcome.lines_written;

        for file in state.sorted_files.drain(..) {
            common::remove_file_quiet(&file);
        }
        progress.display_label(&format!("Sorted records: {}", summary.sorted_records));
        Ok(summary)
    }

    /// One sample/split/distribute pass over a pending source. Buckets that
    /// fit go to the final list; oversized ones are concatenated back into a
    /// single file and requeued.
    #[allow(clippy::too_many_arguments)]
    fn split_pass(
        &self,
        pending: PendingSplit,
        extractor: &KeyExtractor,
        tmp_dir: &Path,
        min_chunk_size: u64,
        max_chunk_size: u64,
        round: u32,
        state: &mut JobState,
        progress: &dyn ProgressSink,
    ) -> SortResult<ScanStats> {
        let config = &self.config;
        let source_size = common::file_size(&pending.source)?;
        let estimate = evaluate_key_size(
            &pending.source,
            extractor,
            pending.header,
            config.worker_count,
            progress,
        )?;

        let conservative = ((max_chunk_size as f64 * CHUNK_TARGET_RATIO) as u64)
            .max(min_chunk_size)
            .max(1);
        let min_buckets = (1 + source_size / conservative) as usize;
        let max_buckets = (1 + source_size / min_chunk_size.max(1)) as usize;
        let sample_size =
            required_sample_size(min_buckets.saturating_sub(1)).min(estimate.total_lines);

        let sample = extract_key_sample(
            &pending.source,
            extractor,
            &SampleSpec {
                sample_size,
                mean_key_bytes: estimate.mean_key_bytes,
                total_lines: estimate.total_lines,
                max_memory: config.total_memory / 2,
                worker_count: config.worker_count,
                header: pending.header,
            },
            progress,
        )?;
        let splits = choose_split_keys(
            &sample,
            min_buckets.saturating_sub(1).max(1),
            max_buckets.saturating_sub(1).max(1),
            config.worker_count,
        );

        let mut set = BucketSet::build(&pending.range, &splits);
        let spec = DistributeSpec {
            worker_count: config.worker_count,
            per_worker_memory: (config.total_memory / config.worker_count.max(1) as u64)
                .max(MIN_DISTRIBUTOR_MEMORY),
            tmp_dir: tmp_dir.to_path_buf(),
            header: pending.header,
            file_prefix: format!("{}s{}_", job_prefix(&pending.source), round),
        };
        let outcome = match distribute(&pending.source, extractor, &mut set, &spec, progress) {
            Ok(outcome) => outcome,
            Err(err) => {
                if pending.owns_source {
                    common::remove_file_quiet(&pending.source);
                }
                return Err(err);
            }
        };
        if pending.owns_source {
            common::remove_file_quiet(&pending.source);
        }

        let single_bucket = set.len() == 1;
        for mut bucket in set.into_buckets() {
            if bucket.size_bytes <= max_chunk_size || single_bucket {
                // a source that produced no split at all cannot shrink
                // further (one dominant key); sort it as-is
                state.final_buckets.push(bucket);
            } else {
                let source = tmp_dir.join(format!(
                    "{}s{}_chunk{}.txt",
                    job_prefix(&pending.source),
                    round,
                    bucket.id
                ));
                if let Err(err) = concat_files(&bucket.chunk_files, &source) {
                    common::remove_file_quiet(&source);
                    for file in bucket.chunk_files.drain(..) {
                        common::remove_file_quiet(&file);
                    }
                    return Err(err);
                }
                for file in bucket.chunk_files.drain(..) {
                    common::remove_file_quiet(&file);
                }
                bucket.size_bytes = 0;
                state.pending.push(PendingSplit {
                    range: bucket,
                    source,
                    owns_source: true,
                    header: false,
                });
            }
        }
        Ok(outcome.stats)
    }
}

fn job_prefix(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "sort".to_string());
    format!("{}_", stem)
}

fn read_header_line(path: &Path) -> SortResult<Vec<u8>> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    reader.read_until(b'\n', &mut line)?;
    Ok(line)
}
