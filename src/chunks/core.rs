use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use rayon::prelude::*;

use crate::buckets::Bucket;
use crate::common;
use crate::error::{SortError, SortResult};
use crate::key::{Key, KeyExtractor};
use crate::runtime::ProgressSink;
use crate::scan::{RecordCursor, translate_separators};

/// 4MB output buffer — reduces flush frequency for large chunks.
const OUTPUT_BUF_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ChunkSortSpec {
    pub in_sep: u8,
    pub out_sep: u8,
    /// Upper bound the driver enforces before calling; a bucket above it
    /// must be split further, never sorted here.
    pub max_chunk_size: u64,
    pub tmp_dir: PathBuf,
    pub file_prefix: String,
    /// Set when the bucket data still carries the input's header line (the
    /// in-memory path sorts the input file directly).
    pub skip_first_line: bool,
}

/// Sort every bucket's accumulated chunk files into one sorted output file
/// per bucket. Singleton buckets skip the sort (single key value). Chunk
/// files are deleted on success. Returns the total line count written.
pub fn sort_chunks(
    buckets: &mut [Bucket],
    extractor: &KeyExtractor,
    spec: &ChunkSortSpec,
    progress: &dyn ProgressSink,
) -> SortResult<u64> {
    progress.begin_task("Sort chunks");
    let results: SortResult<Vec<u64>> = buckets
        .par_iter_mut()
        .map(|bucket| {
            if progress.is_interruption_requested() {
                return Err(SortError::Interrupted);
            }
            let out_path = spec
                .tmp_dir
                .join(format!("{}bucket_{}_sorted.txt", spec.file_prefix, bucket.id));
            match sort_one(bucket, extractor, spec, &out_path, progress) {
                Ok(lines) => Ok(lines),
                Err(err) => {
                    common::remove_file_quiet(&out_path);
                    Err(err)
                }
            }
        })
        .collect();
    progress.end_task();
    Ok(results?.into_iter().sum())
}

fn sort_one(
    bucket: &mut Bucket,
    extractor: &KeyExtractor,
    spec: &ChunkSortSpec,
    out_path: &PathBuf,
    progress: &dyn ProgressSink,
) -> SortResult<u64> {
    if bucket.chunk_files.is_empty() {
        return Ok(0);
    }
    // the driver splits any bucket above spec.max_chunk_size before calling,
    // except a bucket holding one dominant key, which cannot shrink

    // concatenate the bucket's chunk files into one buffer; every chunk file
    // is newline-terminated by the distributor
    let mut data: Vec<u8> = Vec::with_capacity(bucket.size_bytes as usize);
    for file in &bucket.chunk_files {
        data.extend_from_slice(&common::read_file_bytes(file)?);
    }

    let file = File::create(out_path)?;
    let mut writer = BufWriter::with_capacity(OUTPUT_BUF_SIZE, file);
    let translate = spec.in_sep != spec.out_sep;

    let lines = if bucket.is_singleton() && !translate && !spec.skip_first_line {
        // one key value: the concatenation is already sorted
        writer.write_all(&data)?;
        memchr::memchr_iter(b'\n', &data).count() as u64
    } else if bucket.is_singleton() {
        let mut cursor = RecordCursor::new(&data, 0, data.len());
        let mut out = Vec::with_capacity(OUTPUT_BUF_SIZE);
        let mut lines = 0u64;
        while let Some(record) = cursor.next_record() {
            if spec.skip_first_line && record.start == 0 {
                continue;
            }
            translate_separators(record.content(), spec.in_sep, spec.out_sep, &mut out);
            out.push(b'\n');
            lines += 1;
            if out.len() >= OUTPUT_BUF_SIZE {
                writer.write_all(&out)?;
                out.clear();
            }
        }
        writer.write_all(&out)?;
        lines
    } else {
        // stable (key, offset) sort over line entries
        let mut entries: Vec<(Key, usize, usize)> = Vec::new();
        let mut cursor = RecordCursor::new(&data, 0, data.len());
        let mut counter = 0u64;
        while let Some(record) = cursor.next_record() {
            counter += 1;
            if progress.is_refresh_necessary(counter) && progress.is_interruption_requested() {
                return Err(SortError::Interrupted);
            }
            if spec.skip_first_line && record.start == 0 {
                continue;
            }
            let parsed = extractor.extract(record.content());
            let content = record.content();
            entries.push((parsed.key, record.start, record.start + content.len()));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut out = Vec::with_capacity(OUTPUT_BUF_SIZE);
        for &(_, start, end) in &entries {
            if translate {
                translate_separators(&data[start..end], spec.in_sep, spec.out_sep, &mut out);
            } else {
                out.extend_from_slice(&data[start..end]);
            }
            out.push(b'\n');
            if out.len() >= OUTPUT_BUF_SIZE {
                writer.write_all(&out)?;
                out.clear();
            }
        }
        writer.write_all(&out)?;
        entries.len() as u64
    };
    writer.flush()?;

    if bucket.owns_files {
        for file in bucket.chunk_files.drain(..) {
            common::remove_file_quiet(&file);
        }
    } else {
        bucket.chunk_files.clear();
    }
    bucket.sorted_file = Some(out_path.clone());
    Ok(lines)
}
