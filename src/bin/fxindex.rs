use std::path::PathBuf;
use std::process;

use clap::Parser;

use xsort_rs::mtindex::{IndexationConfig, TableSpec, compute_indexation};
use xsort_rs::runtime::{ConsoleProgress, parse_size};

#[derive(Parser)]
#[command(
    name = "fxindex",
    about = "Compute synchronized chunk boundaries across related sorted tables"
)]
struct Cli {
    /// Root table as PATH:COLS (key columns 1-based, comma-separated; omit
    /// :COLS for a keyless single table)
    root: String,

    /// Secondary table as PATH:COLS, repeatable; the columns hold the root
    /// key prefix
    #[arg(long = "table", value_name = "PATH:COLS")]
    tables: Vec<String>,

    /// Field separator (single character, or \t)
    #[arg(short = 't', long = "field-separator", value_name = "SEP")]
    field_separator: Option<String>,

    /// Tables have a header line
    #[arg(short = 'H', long = "header")]
    header: bool,

    /// Number of parallel readers the plan is computed for
    #[arg(long = "slaves", value_name = "N", default_value_t = 4)]
    slaves: usize,

    /// Memory granted to one reader, e.g. 256M
    #[arg(long = "memory", value_name = "SIZE")]
    memory: Option<String>,

    /// Pin the per-process file size target (testing)
    #[arg(long = "max-chunk", value_name = "SIZE")]
    max_chunk: Option<String>,

    /// Report progress on stderr
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

fn parse_table(spec: &str) -> TableSpec {
    let (path, cols) = match spec.rsplit_once(':') {
        Some((path, cols)) if !cols.is_empty() && !path.is_empty() => (path, Some(cols)),
        _ => (spec, None),
    };
    let key_fields = match cols {
        None => Vec::new(),
        Some(cols) => cols
            .split(',')
            .map(|c| match c.trim().parse::<usize>() {
                Ok(col) if col >= 1 => col - 1,
                _ => {
                    eprintln!("fxindex: invalid key column '{}' in '{}'", c, spec);
                    process::exit(2);
                }
            })
            .collect(),
    };
    TableSpec {
        path: PathBuf::from(path),
        key_fields,
        used: true,
    }
}

fn main() {
    let cli = Cli::parse();

    let sep = match cli.field_separator.as_deref() {
        None => b'\t',
        Some(s) if s.len() == 1 => s.as_bytes()[0],
        Some(s) if s == "\\t" => b'\t',
        Some(s) => {
            eprintln!("fxindex: multi-character separator '{}'", s);
            process::exit(2);
        }
    };

    let mut tables = vec![parse_table(&cli.root)];
    for spec in &cli.tables {
        tables.push(parse_table(spec));
    }

    let slave_memory = match cli.memory.as_deref() {
        Some(spec) => parse_size(spec).unwrap_or_else(|e| {
            eprintln!("fxindex: invalid memory size: {}", e);
            process::exit(2);
        }),
        None => 256 * 1024 * 1024,
    };
    let forced = cli.max_chunk.as_deref().map(|spec| {
        parse_size(spec).unwrap_or_else(|e| {
            eprintln!("fxindex: invalid chunk size: {}", e);
            process::exit(2);
        })
    });

    let config = IndexationConfig {
        sep,
        header: cli.header,
        slave_count: cli.slaves.max(1),
        slave_memory,
        forced_max_size_per_process: forced,
    };

    let progress = ConsoleProgress::new("fxindex", cli.verbose);
    let plan = match compute_indexation(&tables, &config, &progress) {
        Ok(plan) => plan,
        Err(e) if e.is_interrupted() => {
            eprintln!("fxindex: interrupted");
            process::exit(130);
        }
        Err(e) => {
            eprintln!("fxindex: {}", e);
            process::exit(2);
        }
    };

    // one row per chunk: index, last root key, then begin/end/first-record
    // per table
    println!("chunk\tlast_root_key\t{}", {
        let mut head = Vec::new();
        for t in 0..plan.table_count {
            head.push(format!("begin{t}\tend{t}\tfirst_record{t}"));
        }
        head.join("\t")
    });
    for (i, chunk) in plan.chunks.iter().enumerate() {
        let mut row = format!("{}\t{}", i, chunk.last_root_key.label());
        for t in 0..plan.table_count {
            row.push_str(&format!(
                "\t{}\t{}\t{}",
                chunk.begin_pos[t], chunk.end_pos[t], chunk.first_record_index[t]
            ));
        }
        println!("{}", row);
    }
}
