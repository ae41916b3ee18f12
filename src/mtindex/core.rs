use std::mem;
use std::path::PathBuf;

use crate::common;
use crate::error::{SortError, SortResult};
use crate::key::{Key, KeyExtractor};
use crate::keysize::evaluate_key_size;
use crate::finder::find_key_positions;
use crate::indexer::index_file;
use crate::runtime::ProgressSink;
use crate::runtime::resource::DEFAULT_BUFFER_SIZE;
use crate::sampler::{KeyPosition, SampleSpec, extract_key_position_sample};

/// At most this many chunks are assigned to one worker over a run.
const MAX_PROCESS_BY_SLAVE: u64 = 5;

/// One table of the schema. The root table is `tables[0]`; a secondary
/// table's `key_fields` lists the columns holding the root key prefix (its
/// own key may extend it, the extra columns are never read here).
#[derive(Debug, Clone)]
pub struct TableSpec {
    pub path: PathBuf,
    pub key_fields: Vec<usize>,
    /// Unused tables are never opened; their plan entries stay zero.
    pub used: bool,
}

#[derive(Debug, Clone)]
pub struct IndexationConfig {
    pub sep: u8,
    pub header: bool,
    pub slave_count: usize,
    /// Memory granted to one worker; also bounds the root key sample.
    pub slave_memory: u64,
    /// Test hook pinning the per-process file size target.
    pub forced_max_size_per_process: Option<u64>,
}

/// One chunk: per-table byte ranges plus the first record index of each
/// range, and the largest root key fully contained before the chunk (empty
/// for the first chunk and for keyless single-table plans).
#[derive(Debug, Clone)]
pub struct ChunkDescriptor {
    pub begin_pos: Vec<u64>,
    pub end_pos: Vec<u64>,
    pub first_record_index: Vec<u64>,
    pub last_root_key: Key,
}

#[derive(Debug, Clone)]
pub struct ChunkPlan {
    pub table_count: usize,
    pub chunks: Vec<ChunkDescriptor>,
}

impl ChunkPlan {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Compute a synchronized chunk plan for a family of tables sharing the root
/// key. Chunk sizes follow a staircase: ramp-up at the head so workers do
/// not hit the disk together, a plateau, and a shrinking tail so they finish
/// together.
pub fn compute_indexation(
    tables: &[TableSpec],
    config: &IndexationConfig,
    progress: &dyn ProgressSink,
) -> SortResult<ChunkPlan> {
    assert!(!tables.is_empty());
    assert!(tables[0].used, "the root table is always read");

    progress.display_main_label("Index tables");

    let mut sizes = vec![0u64; tables.len()];
    for (t, table) in tables.iter().enumerate() {
        if table.used {
            if !table.path.exists() {
                return Err(SortError::MissingInput(table.path.clone()));
            }
            sizes[t] = common::file_size(&table.path)?;
        }
    }
    let total_size: u64 = sizes.iter().sum();
    let root_size = sizes[0];

    let max_size_per_process = compute_max_size_per_process(config, total_size);
    let root_has_key = !tables[0].key_fields.is_empty();

    // per-used-table cut candidates, parallel arrays over the root sample
    let mut table_positions: Vec<Option<Vec<KeyPosition>>> = vec![None; tables.len()];
    let mut root_keys: Vec<Key> = Vec::new();

    if !root_has_key && config.slave_count >= 2 && total_size > max_size_per_process {
        // single keyless table: cuts on arbitrary record boundaries
        let positions_per_buffer =
            DEFAULT_BUFFER_SIZE.div_ceil(max_size_per_process).max(1) as usize;
        let index = index_file(
            &tables[0].path,
            DEFAULT_BUFFER_SIZE,
            positions_per_buffer,
            progress,
        )?;
        let mut candidates = Vec::new();
        for i in 1..index.len() {
            if index.offsets[i] < root_size {
                candidates.push(KeyPosition {
                    key: Key::new(),
                    line_index: index.line_indexes[i],
                    line_position: index.offsets[i],
                });
            }
        }
        root_keys = vec![Key::new(); candidates.len()];
        table_positions[0] = Some(candidates);
    }

    if root_has_key && config.slave_count >= 2 {
        let root_extractor = KeyExtractor::new(&tables[0].key_fields, config.sep);
        let estimate = evaluate_key_size(
            &tables[0].path,
            &root_extractor,
            config.header,
            config.slave_count,
            progress,
        )?;

        // one sampled root key costs its payload plus a position slot per
        // used table
        let key_position_memory = 2 * estimate.mean_key_bytes
            + mem::size_of::<Key>() as u64
            + tables.len() as u64 * 2 * mem::size_of::<u64>() as u64;
        let mut max_keys = config.slave_memory / key_position_memory.max(1);

        // keep enough cut candidates for the shrinking tail, no more
        let max_slave_processes = 1 + total_size / (max_size_per_process / 8).max(1);
        max_keys = max_keys.min(10 * max_slave_processes);

        let sampling_useful = max_keys >= 10
            && max_size_per_process < total_size
            && estimate.total_lines > 1;
        if sampling_useful {
            let mut sample = extract_key_position_sample(
                &tables[0].path,
                &root_extractor,
                &SampleSpec {
                    sample_size: max_keys,
                    mean_key_bytes: estimate.mean_key_bytes,
                    total_lines: estimate.total_lines,
                    max_memory: config.slave_memory,
                    worker_count: config.slave_count,
                    header: config.header,
                },
                progress,
            )?;
            // a key ending exactly at EOF would delimit an empty last chunk
            if sample.last().map(|e| e.line_position) == Some(root_size) {
                sample.pop();
            }
            root_keys = sample.iter().map(|e| e.key.clone()).collect();
            table_positions[0] = Some(sample);

            let root_width = tables[0].key_fields.len();
            for (t, table) in tables.iter().enumerate().skip(1) {
                if !table.used {
                    continue;
                }
                let width = root_width.min(table.key_fields.len());
                let extractor = KeyExtractor::new(&table.key_fields[..width], config.sep);
                let positions = find_key_positions(
                    &table.path,
                    &extractor,
                    config.header,
                    &root_keys,
                    progress,
                )?;
                table_positions[t] = Some(positions);
            }
        }
    }

    Ok(assemble_chunks(
        tables,
        &sizes,
        &root_keys,
        &table_positions,
        config.slave_count as u64,
        max_size_per_process,
    ))
}

fn compute_max_size_per_process(config: &IndexationConfig, total_size: u64) -> u64 {
    if let Some(forced) = config.forced_max_size_per_process {
        return forced.max(1);
    }
    let mut size = DEFAULT_BUFFER_SIZE.max(config.slave_memory / 2);
    if size * config.slave_count as u64 * MAX_PROCESS_BY_SLAVE > total_size {
        size = DEFAULT_BUFFER_SIZE
            .max(total_size / (config.slave_count as u64 * MAX_PROCESS_BY_SLAVE).max(1));
    }
    size
}

/// Merge the per-key micro-chunks into worker-sized chunks under the
/// head-ramp / plateau / shrinking-tail schedule, then emit the per-table
/// boundary vectors.
fn assemble_chunks(
    tables: &[TableSpec],
    sizes: &[u64],
    root_keys: &[Key],
    table_positions: &[Option<Vec<KeyPosition>>],
    slave_count: u64,
    max_size_per_process: u64,
) -> ChunkPlan {
    let table_count = tables.len();
    let total_size: u64 = sizes.iter().sum();

    // boundary vectors; the first boundary is all zeros
    let mut begin_pos: Vec<Vec<u64>> = vec![vec![0; table_count]];
    let mut begin_index: Vec<Vec<u64>> = vec![vec![0; table_count]];
    let mut last_keys: Vec<Key> = vec![Key::new()];

    let mut pending = 0u64;
    let mut consumed = 0u64;
    for (k, root_key) in root_keys.iter().enumerate() {
        // bytes newly covered by this key across every used table
        for positions in table_positions.iter().flatten() {
            pending += positions[k].line_position;
            if k > 0 {
                pending -= positions[k - 1].line_position;
            }
        }

        let tail_start = total_size.saturating_sub(3 * slave_count * max_size_per_process / 2);
        let target = if consumed > tail_start {
            // landing: smaller and smaller chunks so workers finish together
            if consumed > total_size.saturating_sub(slave_count * max_size_per_process / 4) {
                max_size_per_process / 8
            } else if consumed > total_size.saturating_sub(slave_count * max_size_per_process) {
                max_size_per_process / 4
            } else {
                max_size_per_process / 2
            }
        } else if (begin_pos.len() as u64) < slave_count {
            // head ramp-up, one stair per starting worker
            max_size_per_process * (begin_pos.len() as u64 - 1 + slave_count) / (2 * slave_count)
        } else {
            max_size_per_process
        };

        if pending > target.max(1) {
            consumed += pending;
            pending = 0;

            let mut positions = vec![0u64; table_count];
            let mut indexes = vec![0u64; table_count];
            for (t, table_position) in table_positions.iter().enumerate() {
                if let Some(entries) = table_position {
                    positions[t] = entries[k].line_position;
                    indexes[t] = entries[k].line_index;
                }
            }
            begin_pos.push(positions);
            begin_index.push(indexes);
            last_keys.push(root_key.clone());
        }
    }

    // closing boundary: the used tables' file sizes
    let mut final_positions = vec![0u64; table_count];
    for (t, table) in tables.iter().enumerate() {
        if table.used {
            final_positions[t] = sizes[t];
        }
    }
    begin_pos.push(final_positions);

    let mut chunks = Vec::with_capacity(begin_pos.len() - 1);
    for i in 0..begin_pos.len() - 1 {
        chunks.push(ChunkDescriptor {
            begin_pos: begin_pos[i].clone(),
            end_pos: begin_pos[i + 1].clone(),
            first_record_index: begin_index[i].clone(),
            last_root_key: last_keys[i].clone(),
        });
    }
    ChunkPlan {
        table_count,
        chunks,
    }
}
