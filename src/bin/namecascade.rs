//! namecascade CLI
//!
//! Reads one query per line on stdin and writes one JSON result per line on
//! stdout. Logs go to stderr, filtered by `RUST_LOG`.

use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::error;
use tracing_subscriber::EnvFilter;

use namecascade::{CascadeConfig, CascadeEngine};

#[derive(Default)]
struct Args {
    config: Option<PathBuf>,
    stats: bool,
    compact: bool,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    parsed.config = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    eprintln!("error: --config requires a value");
                    std::process::exit(1);
                }
            }
            "--stats" | "-s" => {
                parsed.stats = true;
                i += 1;
            }
            "--compact" => {
                parsed.compact = true;
                i += 1;
            }
            "--help" | "-h" => {
                println!("namecascade - resolve organization names to canonical legal names");
                println!();
                println!("USAGE:");
                println!("    namecascade [OPTIONS] < queries.txt");
                println!();
                println!("OPTIONS:");
                println!("    -c, --config <FILE>   TOML configuration [default: built-in]");
                println!("    -s, --stats           Print statistics as JSON to stderr at exit");
                println!("        --compact         Compact the correction log and exit");
                println!("    -h, --help            Print help information");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    parsed
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => CascadeConfig::from_file(path)?,
        None => CascadeConfig::default(),
    };
    let engine = CascadeEngine::from_config(&config)?;

    if args.compact {
        let kept = engine.compact_corrections()?;
        eprintln!("compacted correction log: {kept} entries");
        return Ok(());
    }

    let stdin = io::stdin();
    let mut out = BufWriter::new(io::stdout().lock());
    for line in stdin.lock().lines() {
        let line = line?;
        let query = line.trim_end_matches('\r');
        if query.trim().is_empty() {
            continue;
        }
        let result = engine.resolve(query);
        serde_json::to_writer(&mut out, &result)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;

    if args.stats {
        eprintln!("{}", serde_json::to_string_pretty(&engine.statistics())?);
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = parse_args();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "namecascade failed");
            ExitCode::FAILURE
        }
    }
}
