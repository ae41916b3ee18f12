use std::path::PathBuf;
use std::process;

use clap::Parser;

use xsort_rs::dataset::{DatasetSpec, generate};

#[derive(Parser)]
#[command(name = "fxgen", about = "Generate artificial delimited datasets for sort testing")]
struct Cli {
    /// Number of records
    #[arg(short = 'n', long = "lines", default_value_t = 1_000_000)]
    lines: u64,

    /// Fields per record, key columns included
    #[arg(short = 'f', long = "fields", default_value_t = 3)]
    fields: usize,

    /// Key column(s), 1-based, comma-separated
    #[arg(short = 'k', long = "key", value_name = "COLS", default_value = "1")]
    keys: String,

    /// Field separator (single character, or \t)
    #[arg(short = 't', long = "field-separator", value_name = "SEP")]
    field_separator: Option<String>,

    /// Emit a header line
    #[arg(short = 'H', long = "header")]
    header: bool,

    /// Shuffle records instead of emitting them in key order
    #[arg(long = "shuffle")]
    shuffle: bool,

    /// Consecutive records sharing one key value
    #[arg(long = "records-per-key", default_value_t = 1)]
    records_per_key: u64,

    /// Seed for the deterministic shuffle
    #[arg(long = "seed", default_value_t = 1)]
    seed: u64,

    /// Output file
    output: PathBuf,
}

fn main() {
    let cli = Cli::parse();

    let sep = match cli.field_separator.as_deref() {
        None => b'\t',
        Some(s) if s.len() == 1 => s.as_bytes()[0],
        Some(s) if s == "\\t" => b'\t',
        Some(s) => {
            eprintln!("fxgen: multi-character separator '{}'", s);
            process::exit(2);
        }
    };
    let key_fields: Vec<usize> = cli
        .keys
        .split(',')
        .map(|c| match c.trim().parse::<usize>() {
            Ok(col) if col >= 1 => col - 1,
            _ => {
                eprintln!("fxgen: invalid key column '{}'", c);
                process::exit(2);
            }
        })
        .collect();

    let spec = DatasetSpec {
        line_count: cli.lines,
        field_count: cli.fields.max(key_fields.iter().max().map_or(1, |m| m + 1)),
        key_fields,
        sep,
        header: cli.header,
        sorted: !cli.shuffle,
        records_per_key: cli.records_per_key.max(1),
        key_width: 8,
        seed: cli.seed,
    };

    match generate(&cli.output, &spec) {
        Ok(count) => eprintln!("fxgen: wrote {} records to {}", count, cli.output.display()),
        Err(e) => {
            eprintln!("fxgen: {}", e);
            process::exit(2);
        }
    }
}
