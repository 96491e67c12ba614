use std::{
    io::{self, BufWriter, Write},
    num::NonZeroUsize,
    path::PathBuf,
    time::Instant,
};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chunked_brc::{config::DEFAULT_BUFFER_SIZE, digest::DEFAULT_BASE, run, Config};

#[derive(Debug, Parser)]
#[command(version, about = "Per-key min/mean/max over a `<key>;<value>` file")]
struct Args {
    /// File to read.
    #[arg(short, long, default_value = "./data/measurements_1M.txt")]
    filename: PathBuf,

    /// Number of workers (and chunks). Defaults to the number of cores plus one.
    #[arg(short, long, visible_alias = "routines")]
    workers: Option<NonZeroUsize>,

    /// Read buffer per worker, in bytes.
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Multiplier of the key digest. Must be at least 256.
    #[arg(long, default_value_t = DEFAULT_BASE)]
    digest_base: u64,

    /// Fail on digest collisions instead of merging the colliding keys.
    #[arg(long)]
    strict_keys: bool,
}

fn main() -> anyhow::Result<()> {
    let started = Instant::now();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let mut config = Config::new(&args.filename)
        .with_buffer_size(args.buffer_size)
        .with_digest_base(args.digest_base)
        .with_strict_keys(args.strict_keys);
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }

    info!(file = %args.filename.display(), "reading file");
    let report = run(&config)
        .with_context(|| format!("failed to aggregate {}", args.filename.display()))?;

    let stdout = io::stdout().lock();
    let mut writer = BufWriter::new(stdout);
    writeln!(writer, "{}", report)?;
    writer.flush()?;

    info!(elapsed = ?started.elapsed(), "finished");
    Ok(())
}
