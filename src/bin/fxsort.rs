use std::path::PathBuf;
use std::process;

use clap::Parser;

use xsort_rs::runtime::{ConsoleProgress, parse_size};
use xsort_rs::sorter::{SortConfig, SortDriver};

#[derive(Parser)]
#[command(name = "fxsort", about = "Parallel external sort for large delimited text files")]
struct Cli {
    /// Key column(s), 1-based, comma-separated, in key order
    #[arg(short = 'k', long = "key", value_name = "COLS", default_value = "1")]
    keys: String,

    /// Field separator (single character, or \t)
    #[arg(short = 't', long = "field-separator", value_name = "SEP")]
    field_separator: Option<String>,

    /// Field separator for the output (defaults to the input separator)
    #[arg(long = "output-field-separator", value_name = "SEP")]
    output_field_separator: Option<String>,

    /// First line is a header; it is kept on top, never sorted
    #[arg(short = 'H', long = "header")]
    header: bool,

    /// Drop the header line from the output
    #[arg(long = "no-output-header")]
    no_output_header: bool,

    /// Number of parallel workers (default: all cores)
    #[arg(long = "parallel", value_name = "N")]
    parallel: Option<usize>,

    /// Total memory budget, e.g. 512M or 4G
    #[arg(short = 'S', long = "buffer-size", value_name = "SIZE")]
    buffer_size: Option<String>,

    /// Use DIR for temporaries, not $TMPDIR or /tmp
    #[arg(short = 'T', long = "temporary-directory", value_name = "DIR")]
    temp_dir: Option<PathBuf>,

    /// Report progress on stderr
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// File to sort
    input: PathBuf,

    /// Sorted output file
    output: PathBuf,
}

fn parse_separator(spec: &str) -> u8 {
    if spec.len() == 1 {
        spec.as_bytes()[0]
    } else if spec == "\\t" {
        b'\t'
    } else {
        eprintln!("fxsort: multi-character separator '{}'", spec);
        process::exit(2);
    }
}

fn parse_key_columns(spec: &str) -> Vec<usize> {
    let mut columns = Vec::new();
    for part in spec.split(',') {
        match part.trim().parse::<usize>() {
            Ok(col) if col >= 1 => columns.push(col - 1),
            _ => {
                eprintln!("fxsort: invalid key column '{}'", part);
                process::exit(2);
            }
        }
    }
    columns
}

fn main() {
    let cli = Cli::parse();

    let key_fields = parse_key_columns(&cli.keys);
    let in_sep = cli
        .field_separator
        .as_deref()
        .map(parse_separator)
        .unwrap_or(b'\t');
    let out_sep = cli
        .output_field_separator
        .as_deref()
        .map(parse_separator)
        .unwrap_or(in_sep);

    let total_memory = match cli.buffer_size.as_deref() {
        Some(spec) => parse_size(spec).unwrap_or_else(|e| {
            eprintln!("fxsort: invalid buffer size: {}", e);
            process::exit(2);
        }),
        None => 512 * 1024 * 1024,
    };
    let worker_count = cli
        .parallel
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(4, |n| n.get()))
        .max(1);

    let config = SortConfig {
        key_fields,
        in_sep,
        out_sep,
        header: cli.header,
        output_header: cli.header && !cli.no_output_header,
        worker_count,
        total_memory,
        tmp_dir: cli.temp_dir,
    };

    let progress = ConsoleProgress::new("fxsort", cli.verbose);
    let driver = SortDriver::new(config, &progress);
    match driver.sort(&cli.input, &cli.output) {
        Ok(summary) => {
            if cli.verbose {
                eprintln!("fxsort: {} records sorted", summary.sorted_records);
                if !summary.stats.is_clean() {
                    eprintln!(
                        "fxsort: warnings: {} overlong, {} short, {} encoding",
                        summary.stats.long_lines,
                        summary.stats.short_lines,
                        summary.stats.encoding_errors
                    );
                }
            }
        }
        Err(e) if e.is_interrupted() => {
            eprintln!("fxsort: interrupted");
            process::exit(130);
        }
        Err(e) => {
            eprintln!("fxsort: {}", e);
            process::exit(2);
        }
    }
}
