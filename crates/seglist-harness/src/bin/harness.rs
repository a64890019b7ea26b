//! CLI entrypoint for the seglist trace harness.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use seglist_core::HeapConfig;
use seglist_harness::logging::LogEmitter;
use seglist_harness::{RunnerConfig, Trace, TraceRunner};

/// Workload tooling for the seglist allocator.
#[derive(Debug, Parser)]
#[command(name = "seglist-harness")]
#[command(about = "Trace-driven workload runner for the seglist allocator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute a trace file against a fresh heap and validate it.
    Run {
        /// Trace JSON file to execute.
        #[arg(long)]
        trace: PathBuf,
        /// Optional JSONL structured log output path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Optional JSON report output path (stdout if omitted).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Heap growth limit in bytes (unlimited if omitted).
        #[arg(long)]
        heap_limit: Option<usize>,
        /// Bytes per default heap extension.
        #[arg(long, default_value_t = seglist_core::CHUNK_SIZE)]
        chunk_size: usize,
        /// Run a whole-heap scan every N operations (0 disables).
        #[arg(long, default_value_t = 64)]
        check_every: usize,
    },
    /// Generate a deterministic pseudo-random trace file.
    Gen {
        /// Seed for the workload generator.
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Number of operations to generate.
        #[arg(long, default_value_t = 1000)]
        ops: usize,
        /// Largest request size in bytes.
        #[arg(long, default_value_t = 1024)]
        max_size: usize,
        /// Output trace JSON path (stdout if omitted).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Parse and sanity-check a trace file without executing it.
    Check {
        /// Trace JSON file to validate.
        #[arg(long)]
        trace: PathBuf,
    },
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Run {
            trace,
            log,
            report,
            heap_limit,
            chunk_size,
            check_every,
        } => {
            let workload = Trace::from_file(&trace)?;
            let config = RunnerConfig {
                heap: HeapConfig {
                    chunk_size,
                    heap_limit: heap_limit.unwrap_or(usize::MAX),
                },
                check_every,
            };

            let mut runner = TraceRunner::new(config)?;
            if let Some(path) = log {
                runner = runner.with_log(LogEmitter::to_file(&path)?);
            }

            let summary = runner.run(&workload)?;
            let json = serde_json::to_string_pretty(&summary)?;
            match report {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{json}"),
            }
            Ok(())
        }
        Command::Gen {
            seed,
            ops,
            max_size,
            output,
        } => {
            let trace = Trace::generate(seed, ops, max_size);
            let json = trace.to_json()?;
            match output {
                Some(path) => std::fs::write(path, json)?,
                None => println!("{json}"),
            }
            Ok(())
        }
        Command::Check { trace } => {
            let workload = Trace::from_file(&trace)?;
            println!("{}: {} ops, version {}", workload.name, workload.ops.len(), workload.version);
            Ok(())
        }
    }
}
