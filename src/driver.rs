use std::{
    fs::File,
    num::NonZeroUsize,
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::merge::merge;
use crate::report::Report;
use crate::worker::{aggregate_chunk, Partial};

/// A half-open byte range `[start, end)` handed to one worker. `end == None`
/// means "to end of file" and is only used for the last chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub start: u64,
    pub end: Option<u64>,
}

impl Chunk {
    pub fn new(index: usize, start: u64, end: Option<u64>) -> Self {
        Self { index, start, end }
    }

    /// The first chunk starts on a record boundary and skips nothing.
    pub fn is_first(&self) -> bool {
        self.index == 0
    }
}

/// Splits `len` bytes into `workers` chunks starting at `i * (len / workers)`.
pub fn chunk_boundaries(len: u64, workers: NonZeroUsize) -> Vec<Chunk> {
    let workers = workers.get();
    let chunk_size = len / workers as u64;

    (0..workers)
        .map(|i| {
            let start = i as u64 * chunk_size;
            let end = if i == workers - 1 {
                None
            } else {
                Some(start + chunk_size)
            };
            Chunk::new(i, start, end)
        })
        .collect()
}

/// Scans the file described by `config` in parallel and returns the merged,
/// not yet sorted, result.
pub fn aggregate_file(config: &Config) -> Result<Partial> {
    config.validate()?;

    let open_error = |source| Error::Open {
        path: config.path.clone(),
        source,
    };
    let metadata = File::open(&config.path)
        .and_then(|file| file.metadata())
        .map_err(open_error)?;
    let chunks = chunk_boundaries(metadata.len(), config.workers);
    info!(
        path = %config.path.display(),
        bytes = metadata.len(),
        workers = chunks.len(),
        "running with {} workers (and as many chunks)",
        chunks.len()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.get())
        .thread_name(|i| format!("chunk-worker-{}", i))
        .build()?;

    let cancel = AtomicBool::new(false);
    let results: Vec<Result<Partial>> = pool.install(|| {
        chunks
            .into_par_iter()
            .map(|chunk| {
                let result = aggregate_chunk(config, chunk, &cancel);
                if result.is_err() {
                    cancel.store(true, Ordering::Relaxed);
                }
                result
            })
            .collect()
    });

    let partials = first_failure(results)?;
    for (i, partial) in partials.iter().enumerate() {
        debug!(chunk = i, keys = partial.len(), records = partial.records(), "partial result");
    }

    merge(partials, config.strict_keys)
}

/// Returns every partial, or the error that caused the run to stop rather
/// than the cancellations it triggered.
fn first_failure(results: Vec<Result<Partial>>) -> Result<Vec<Partial>> {
    let mut partials = Vec::with_capacity(results.len());
    let mut cancelled = None;

    for result in results {
        match result {
            Ok(partial) => partials.push(partial),
            Err(Error::Cancelled) => cancelled = Some(Error::Cancelled),
            Err(e) => return Err(e),
        }
    }

    match cancelled {
        Some(e) => Err(e),
        None => Ok(partials),
    }
}

/// Runs the whole pipeline and returns the key-sorted result.
pub fn run(config: &Config) -> Result<Report> {
    let started = Instant::now();
    let merged = aggregate_file(config)?;
    let report = Report::from(merged);
    info!(
        keys = report.len(),
        elapsed = ?started.elapsed(),
        "aggregation finished"
    );
    Ok(report)
}
