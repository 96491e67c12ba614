//! Parallel min/mean/max aggregation over `<key>;<value>` lines.
//!
//! The file is split into byte ranges, one per worker. Each worker opens its
//! own handle, streams records through a fixed-size buffer and aggregates them
//! by a digest of the key. The per-worker maps are merged once every worker
//! has finished.

pub mod config;
pub mod digest;
pub mod driver;
pub mod error;
pub mod fixed;
pub mod merge;
pub mod reader;
pub mod report;
pub mod worker;

pub use config::Config;
pub use digest::{KeyDigest, KeyHasher};
pub use driver::{aggregate_file, chunk_boundaries, run, Chunk};
pub use error::{Error, MalformedKind, Result};
pub use merge::merge;
pub use reader::{ChunkReader, Record};
pub use report::Report;
pub use worker::{aggregate_chunk, Aggregate, Partial, Summary};
