//! chunkcopy CLI - ordered multi-threaded file copy

use chunkcopy::config::{CliArgs, CopyConfig, OutputFormat};
use chunkcopy::copy::CopyEngine;
use chunkcopy::error::Result;
use chunkcopy::progress::ProgressReporter;
use clap::Parser;
use mimalloc::MiMalloc;
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Initialize logging; RUST_LOG wins over -v
    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&args) {
        eprintln!("Error [{}]: {}", e.kind(), e);
        std::process::exit(1);
    }
}

fn run(args: &CliArgs) -> Result<()> {
    let config = CopyConfig::from_cli(args)?;

    if args.verbose > 0 && !args.quiet {
        print_config(&config);
    }

    let progress = if args.progress && !args.quiet {
        ProgressReporter::new()
    } else {
        ProgressReporter::disabled()
    };

    let report = CopyEngine::new(config).with_progress(progress).execute()?;

    match args.output_format {
        OutputFormat::Json => match report.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to serialize report: {}", e),
        },
        OutputFormat::Text => {
            if !args.quiet || args.timings {
                report.print_summary();
            }
        }
    }

    Ok(())
}

fn print_config(config: &CopyConfig) {
    println!("=== Configuration ===");
    println!("Source:          {}", config.source.display());
    println!("Destination:     {}", config.destination.display());
    println!("Mode:            {}", config.mode.name());
    println!(
        "Chunk size:      {}",
        humansize::format_size(config.pipeline.chunk_size as u64, humansize::BINARY)
    );
    match config.mode {
        chunkcopy::CopyMode::Pipeline => {
            println!("Readers:         {}", config.pipeline.readers);
            println!("Writers:         {}", config.pipeline.writers);
            println!("Queue capacity:  {}", config.pipeline.queue_capacity);
        }
        chunkcopy::CopyMode::Ranged => println!("Threads:         {}", config.threads),
        chunkcopy::CopyMode::Direct => {}
    }
    if let Some(algo) = config.verify {
        println!("Verify:          {}", algo.name());
    }
    println!();
}
