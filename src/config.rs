use std::{
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use crate::digest::{DEFAULT_BASE, MIN_BASE};
use crate::error::{Error, Result};

pub const DEFAULT_BUFFER_SIZE: usize = 5 * 1024 * 1024;

/// Everything a run needs to know. Flag syntax lives in the binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub path: PathBuf,
    pub workers: NonZeroUsize,
    pub buffer_size: usize,
    pub digest_base: u64,
    /// Compare raw keys whenever digests match and fail on a collision.
    pub strict_keys: bool,
}

impl Config {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            workers: default_workers(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            digest_base: DEFAULT_BASE,
            strict_keys: false,
        }
    }

    pub fn with_workers(mut self, workers: NonZeroUsize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_digest_base(mut self, digest_base: u64) -> Self {
        self.digest_base = digest_base;
        self
    }

    pub fn with_strict_keys(mut self, strict_keys: bool) -> Self {
        self.strict_keys = strict_keys;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.buffer_size == 0 {
            return Err(Error::InvalidConfig("buffer size must be positive"));
        }
        if self.digest_base < MIN_BASE {
            return Err(Error::InvalidConfig("digest base must be at least 256"));
        }
        Ok(())
    }
}

/// One more worker than the machine has cores.
pub fn default_workers() -> NonZeroUsize {
    let cores = std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
    NonZeroUsize::new(cores + 1).unwrap_or(NonZeroUsize::MIN)
}
