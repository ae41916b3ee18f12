use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::runtime::random::ith_random_int;

/// Shape of an artificial delimited dataset. Generation is fully
/// deterministic for a given spec, including the shuffled order.
#[derive(Debug, Clone)]
pub struct DatasetSpec {
    pub line_count: u64,
    /// Total number of fields per record, key columns included.
    pub field_count: usize,
    /// Which columns carry the key ordinal.
    pub key_fields: Vec<usize>,
    pub sep: u8,
    pub header: bool,
    /// Emit records in key order, or deterministically shuffled.
    pub sorted: bool,
    /// Consecutive records sharing one key value.
    pub records_per_key: u64,
    /// Zero-padding width of the key ordinal.
    pub key_width: usize,
    pub seed: u64,
}

impl Default for DatasetSpec {
    fn default() -> Self {
        DatasetSpec {
            line_count: 1000,
            field_count: 3,
            key_fields: vec![0],
            sep: b'\t',
            header: false,
            sorted: true,
            records_per_key: 1,
            key_width: 8,
            seed: 1,
        }
    }
}

/// Write the dataset to `path`; returns the number of records written
/// (header excluded).
pub fn generate(path: &Path, spec: &DatasetSpec) -> io::Result<u64> {
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(4 * 1024 * 1024, file);
    let sep = spec.sep as char;

    if spec.header {
        for col in 0..spec.field_count {
            if col > 0 {
                write!(writer, "{}", sep)?;
            }
            if spec.key_fields.contains(&col) {
                write!(writer, "Key{}", col)?;
            } else {
                write!(writer, "Var{}", col)?;
            }
        }
        writeln!(writer)?;
    }

    // emission order: identity, or a seeded Fisher-Yates permutation
    let mut order: Vec<u64> = (0..spec.line_count).collect();
    if !spec.sorted {
        for i in (1..order.len()).rev() {
            let j = ith_random_int(spec.seed.wrapping_add(i as u64), i as u64) as usize;
            order.swap(i, j);
        }
    }

    for &record in &order {
        let ordinal = record / spec.records_per_key.max(1);
        for col in 0..spec.field_count {
            if col > 0 {
                write!(writer, "{}", sep)?;
            }
            if spec.key_fields.contains(&col) {
                write!(writer, "k{:0width$}", ordinal, width = spec.key_width)?;
            } else {
                write!(writer, "v{}_{}", col, record)?;
            }
        }
        writeln!(writer)?;
    }
    writer.flush()?;
    Ok(spec.line_count)
}
