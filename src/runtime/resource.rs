/// Memory and buffer arithmetic shared by the scan tasks. Every worker gets
/// an explicit budget computed here and must stay under it; the distributor
/// refuses to start below its floor.
use std::mem;

pub const KIB: u64 = 1024;
pub const MIB: u64 = 1024 * 1024;

/// Default scan buffer, one task range per buffer.
pub const DEFAULT_BUFFER_SIZE: u64 = 8 * MIB;

/// Granularity and floor for computed buffer sizes.
pub const PREFERRED_BUFFER_SIZE: u64 = 4 * MIB;

/// Ceiling for computed buffer sizes.
pub const MAX_PREFERRED_BUFFER_SIZE: u64 = 128 * MIB;

/// Smallest buffer the engine will ever schedule.
pub const MIN_PREFERRED_BUFFER_SIZE: u64 = MIB;

/// Contiguous bytes a spill file should reach before disk seeks dominate.
pub const MIN_FRAGMENT_SIZE: u64 = 2 * MIB;

/// Floor under which the distributor must not start: one read buffer, one
/// write buffer, one preferred buffer of bucket slack.
pub const MIN_DISTRIBUTOR_MEMORY: u64 = MIB + MIB + PREFERRED_BUFFER_SIZE;

/// Files at most this big are sorted in one pass when they also fit in one
/// worker's memory.
pub const IN_MEMORY_SORT_LIMIT: u64 = 100 * MIB;

/// A chunk is loaded whole into one buffer, so it can never exceed this.
pub const MAX_CHUNK_HARD_LIMIT: u64 = i32::MAX as u64;

/// Round `size` down to a multiple of `unit`, never below `unit`.
fn round_to_unit(size: u64, unit: u64) -> u64 {
    (size / unit).max(1) * unit
}

/// Parse a size string like "10K", "1M", "1G".
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty size".to_string());
    }

    let (num_part, suffix) = if s.ends_with(|c: char| c.is_ascii_alphabetic()) {
        let (n, s) = s.split_at(s.len() - 1);
        (n, s.chars().next())
    } else {
        (s, None)
    };

    let base: u64 = num_part
        .parse()
        .map_err(|_| format!("invalid size: {}", s))?;

    let multiplier = match suffix {
        Some('K') | Some('k') => KIB,
        Some('M') | Some('m') => MIB,
        Some('G') | Some('g') => 1024 * MIB,
        Some('T') | Some('t') => 1024 * 1024 * MIB,
        Some(c) => return Err(format!("invalid suffix '{}' in size", c)),
        None => 1,
    };

    Ok(base * multiplier)
}

/// Read-buffer size for the key samplers, from the per-worker budget:
/// `budget = buffer + 2·key_bytes·total_lines·buffer/file_size + key_bytes`,
/// solved for `buffer`, clamped and rounded, then shrunk until every worker
/// gets at least five assignments.
pub fn sampler_buffer_size(
    max_memory: u64,
    mean_key_bytes: u64,
    total_lines: u64,
    file_size: u64,
    worker_count: usize,
) -> u64 {
    let key_density =
        2.0 * mean_key_bytes as f64 * total_lines as f64 / file_size.max(1) as f64;
    let solved = (max_memory.saturating_sub(mean_key_bytes)) as f64 / (1.0 + key_density);
    let mut buffer = (solved as u64)
        .clamp(PREFERRED_BUFFER_SIZE, MAX_PREFERRED_BUFFER_SIZE);
    buffer = round_to_unit(buffer, PREFERRED_BUFFER_SIZE);

    // At least 5 assignments per worker, so late rate adjustments still have
    // tasks to apply to.
    let min_tasks = 5 * worker_count.max(1) as u64;
    while buffer > PREFERRED_BUFFER_SIZE && file_size / buffer < min_tasks {
        buffer -= PREFERRED_BUFFER_SIZE;
    }
    buffer.max(MIN_PREFERRED_BUFFER_SIZE)
}

/// Min/max chunk sizes for one sort pass.
#[derive(Debug, Clone, Copy)]
pub struct ChunkLimits {
    pub min_chunk_size: u64,
    pub max_chunk_size: u64,
}

/// Per-line sorting overhead inside the chunk sorter: one key-line entry plus
/// the key payload, tripled for sort scratch.
pub fn chunk_sort_line_overhead(mean_key_bytes: u64) -> u64 {
    let key_line_pair = mem::size_of::<crate::key::Key>() as u64 + 2 * mem::size_of::<u64>() as u64;
    3 * (key_line_pair + mean_key_bytes)
}

/// Largest chunk one worker can sort in `slave_memory`: the chunk bytes plus
/// the per-line overhead scaled by the file's line density must fit.
pub fn max_chunk_size(
    mean_key_bytes: u64,
    slave_memory: u64,
    total_lines: u64,
    file_size: u64,
) -> u64 {
    let density =
        chunk_sort_line_overhead(mean_key_bytes) as f64 * total_lines as f64
            / file_size.max(1) as f64;
    let solved = (slave_memory as f64 / (1.0 + density)) as u64;
    solved.min(MAX_CHUNK_HARD_LIMIT).min(file_size)
}

/// Smallest reasonable chunk: with many workers each writing into many
/// buckets, fragments shrink with the square root of the file size. The
/// half factor accounts for the spill policy flushing only the biggest
/// buckets.
pub fn min_chunk_size(file_size: u64) -> u64 {
    let sqrt = ((file_size as f64 * MIN_FRAGMENT_SIZE as f64).sqrt()) as u64;
    sqrt.max(MIN_FRAGMENT_SIZE) / 2
}

pub fn compute_chunk_limits(
    file_size: u64,
    total_lines: u64,
    mean_key_bytes: u64,
    slave_memory: u64,
) -> ChunkLimits {
    let max = max_chunk_size(mean_key_bytes, slave_memory, total_lines, file_size);
    let min = min_chunk_size(file_size).min(max.max(1));
    ChunkLimits {
        min_chunk_size: min,
        max_chunk_size: max,
    }
}

/// Buffer size for a task at byte offset `pos` of a `file_size` scan: ramps
/// up over the first stretch, plateaus, ramps down near the tail, so workers
/// neither hit the disk together at start nor idle together at the end.
pub fn stair_buffer_size(min: u64, max: u64, preferred: u64, pos: u64, file_size: u64) -> u64 {
    debug_assert!(min <= max);
    if min >= max || file_size == 0 {
        return min.max(1);
    }
    let head = 4 * max;
    let size = if pos < head.min(file_size / 2) {
        min + (max - min) * pos / head
    } else if file_size.saturating_sub(pos) < head.min(file_size / 2) {
        min + (max - min) * (file_size - pos) / head
    } else {
        max
    };
    round_to_unit(size.clamp(min, max), preferred.min(min).max(1))
}
