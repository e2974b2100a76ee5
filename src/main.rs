use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use env_logger::{Builder, Env};
use log::{debug, LevelFilter};

use stroke_preprocessing::config::OutputLayout;
use stroke_preprocessing::report::monitor_memory;
use stroke_preprocessing::{EncodingSelection, Pipeline, PipelineConfig};

/// Split a labeled CSV into train/validation/test and encode it without leakage.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file; missing keys fall back to the stroke defaults
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Raw input CSV
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Directory for the encoded partitions (expansion runs go to <dir>/onehot)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// vocabulary, expansion or both
    #[arg(short, long)]
    encoding: Option<EncodingSelection>,
    /// Seed for the stratified split
    #[arg(short, long)]
    seed: Option<u64>,
    /// Verbose level, repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let env = Env::new().filter("STROKE_LOG");
    Builder::new()
        .filter(Some("stroke_preprocessing"), log_level)
        .parse_env(env)
        .init();

    debug!("Arguments {:#?}", cli);

    let start_time = Instant::now();
    let start_memory = monitor_memory();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("could not load configuration {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(input) = cli.input {
        config.raw_path = input;
    }
    if let Some(dir) = cli.output_dir {
        config.outputs = OutputLayout::under(dir);
    }
    if let Some(encoding) = cli.encoding {
        config.encoding = encoding;
    }
    if let Some(seed) = cli.seed {
        config.seed = seed;
    }

    let raw_path = config.raw_path.clone();
    let report = Pipeline::new(config)?
        .run()
        .with_context(|| format!("preprocessing {} failed", raw_path.display()))?;
    println!("{}", report);

    let end_memory = monitor_memory();
    let duration = start_time.elapsed();

    println!("Time elapsed: {:?}", duration);
    println!(
        "Memory used: {} KiB",
        end_memory.saturating_sub(start_memory) / 1024
    );

    Ok(())
}
