use std::{
    collections::hash_map::Entry,
    fmt,
    io::Read,
    sync::atomic::{AtomicBool, Ordering},
    time::Instant,
};

use ahash::AHashMap;
use tracing::debug;

use crate::config::Config;
use crate::digest::{KeyDigest, KeyHasher};
use crate::driver::Chunk;
use crate::error::{Error, Result};
use crate::fixed::Tenths;
use crate::reader::ChunkReader;

/// Roughly the number of distinct keys in a typical measurements file.
const EXPECTED_KEYS: usize = 10_000;

/// How many records a worker processes between checks of the cancel flag.
const CANCEL_CHECK_INTERVAL: u64 = 1 << 16;

/// Running statistics for one key, in tenths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregate {
    pub count: u64,
    pub sum: i64,
    pub min: i64,
    pub max: i64,
}

/// `min`, `mean` and `max` in real units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

impl Aggregate {
    pub fn new(value: i64) -> Self {
        Self {
            count: 1,
            sum: value,
            min: value,
            max: value,
        }
    }

    /// Adds one value. Returns `None`, leaving `self` untouched, when the sum
    /// would overflow.
    #[inline(always)]
    #[must_use]
    pub fn record(&mut self, value: i64) -> Option<()> {
        self.sum = self.sum.checked_add(value)?;
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        Some(())
    }

    #[must_use]
    pub fn merge(&mut self, other: &Aggregate) -> Option<()> {
        self.sum = self.sum.checked_add(other.sum)?;
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        Some(())
    }

    /// Mean in tenths, rounded half toward positive infinity.
    pub fn mean_tenths(&self) -> i64 {
        let sum = self.sum as i128;
        let count = self.count as i128;
        (2 * sum + count).div_euclid(2 * count) as i64
    }

    pub fn mean(&self) -> f64 {
        self.sum as f64 / self.count as f64 / 10.0
    }

    pub fn summary(&self) -> Summary {
        Summary {
            min: self.min as f64 / 10.0,
            mean: self.mean(),
            max: self.max as f64 / 10.0,
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            Tenths(self.min),
            Tenths(self.mean_tenths()),
            Tenths(self.max)
        )
    }
}

/// Everything one worker learned about its chunk: aggregates by digest and
/// the first spelling of each key it saw.
#[derive(Debug, Default, Clone)]
pub struct Partial {
    pub(crate) aggregates: AHashMap<KeyDigest, Aggregate>,
    pub(crate) names: AHashMap<KeyDigest, Box<[u8]>>,
    pub(crate) records: u64,
}

impl Partial {
    pub fn with_capacity(keys: usize) -> Self {
        Self {
            aggregates: AHashMap::with_capacity(keys),
            names: AHashMap::with_capacity(keys),
            records: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.aggregates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aggregates.is_empty()
    }

    /// Records folded into this result.
    pub fn records(&self) -> u64 {
        self.records
    }

    pub fn get(&self, digest: KeyDigest) -> Option<&Aggregate> {
        self.aggregates.get(&digest)
    }

    pub fn name(&self, digest: KeyDigest) -> Option<&[u8]> {
        self.names.get(&digest).map(|n| &n[..])
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyDigest, &Aggregate)> {
        self.aggregates.iter().map(|(&d, a)| (d, a))
    }

    /// Folds one record in. With `strict` the key is compared with the
    /// canonical spelling of its digest.
    #[inline(always)]
    pub fn observe(
        &mut self,
        digest: KeyDigest,
        key: &[u8],
        value: i64,
        strict: bool,
    ) -> Result<()> {
        self.records += 1;
        match self.aggregates.entry(digest) {
            Entry::Occupied(entry) => {
                if strict {
                    if let Some(name) = self.names.get(&digest) {
                        if &name[..] != key {
                            return Err(collision(digest, name, key));
                        }
                    }
                }
                if entry.into_mut().record(value).is_none() {
                    let name = self.names.get(&digest).map_or(key, |n| &n[..]);
                    return Err(sum_overflow(name));
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(Aggregate::new(value));
                self.names.insert(digest, key.into());
            }
        }
        Ok(())
    }

    /// Drains `reader` into this result.
    pub fn consume<R: Read>(
        &mut self,
        reader: &mut ChunkReader<R>,
        hasher: KeyHasher,
        strict: bool,
        cancel: &AtomicBool,
    ) -> Result<()> {
        while let Some(record) = reader.next_record()? {
            self.observe(hasher.digest(record.key), record.key, record.value, strict)?;
            if self.records % CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
        }
        Ok(())
    }
}

pub(crate) fn collision(digest: KeyDigest, first: &[u8], second: &[u8]) -> Error {
    Error::DigestCollision {
        digest,
        first: String::from_utf8_lossy(first).into_owned(),
        second: String::from_utf8_lossy(second).into_owned(),
    }
}

pub(crate) fn sum_overflow(key: &[u8]) -> Error {
    Error::SumOverflow {
        key: String::from_utf8_lossy(key).into_owned(),
    }
}

/// Aggregates one chunk of the file with its own handle and buffer.
pub fn aggregate_chunk(config: &Config, chunk: Chunk, cancel: &AtomicBool) -> Result<Partial> {
    let started = Instant::now();
    debug!(
        chunk = chunk.index,
        start = chunk.start,
        end = ?chunk.end,
        "reading chunk"
    );

    let mut reader = ChunkReader::open(&config.path, chunk.start, chunk.end, config.buffer_size)?;
    if !chunk.is_first() {
        reader.skip_partial_leading_record()?;
    }

    let hasher = KeyHasher::new(config.digest_base);
    let mut partial = Partial::with_capacity(EXPECTED_KEYS);
    partial.consume(&mut reader, hasher, config.strict_keys, cancel)?;

    debug!(
        chunk = chunk.index,
        stopped_at = reader.offset(),
        bytes = reader.delivered(),
        records = partial.records(),
        keys = partial.len(),
        digest_base = hasher.base(),
        elapsed = ?started.elapsed(),
        "chunk done"
    );
    Ok(partial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MalformedKind;

    fn partial_of(data: &[u8], base: u64, strict: bool) -> Result<Partial> {
        let mut reader = ChunkReader::new(data, 0, None, 64);
        let mut partial = Partial::default();
        partial.consume(&mut reader, KeyHasher::new(base), strict, &AtomicBool::new(false))?;
        Ok(partial)
    }

    #[test]
    fn numeric_exactness() {
        let mut agg = Aggregate::new(10);
        agg.record(-25).unwrap();
        agg.record(100).unwrap();

        assert_eq!(
            agg,
            Aggregate {
                count: 3,
                sum: 85,
                min: -25,
                max: 100
            }
        );
        assert!((agg.mean() - 85.0 / 3.0 / 10.0).abs() < 1e-12);
        assert_eq!(agg.mean_tenths(), 28);
        assert_eq!(agg.to_string(), "-2.5/2.8/10.0");
    }

    #[test]
    fn mean_rounds_half_up() {
        let agg = Aggregate {
            count: 2,
            sum: 205,
            min: 85,
            max: 120,
        };
        assert_eq!(agg.mean_tenths(), 103);

        let negative = Aggregate {
            count: 2,
            sum: -205,
            min: -120,
            max: -85,
        };
        assert_eq!(negative.mean_tenths(), -102);
    }

    #[test]
    fn summary_in_real_units() {
        let mut agg = Aggregate::new(-32);
        agg.record(8).unwrap();
        let summary = agg.summary();
        assert_eq!(summary.min, -3.2);
        assert_eq!(summary.max, 0.8);
        assert!((summary.mean + 1.2).abs() < 1e-12);
    }

    #[test]
    fn sum_overflow_is_refused() {
        let mut agg = Aggregate::new(i64::MAX - 5);
        agg.record(5).unwrap();
        let before = agg;
        assert_eq!(agg.record(1), None);
        assert_eq!(agg, before);

        let mut low = Aggregate::new(i64::MIN);
        assert_eq!(low.merge(&Aggregate::new(-1)), None);
        assert_eq!(low, Aggregate::new(i64::MIN));
        low.merge(&Aggregate::new(i64::MAX)).unwrap();
        assert_eq!((low.count, low.sum), (2, -1));
    }

    #[test]
    fn overflowing_key_fails_the_worker() {
        let data = b"Riga;1.0\nA;900000000000000000.0\nA;900000000000000000.0\n";
        let err = partial_of(data, 257, false).unwrap_err();
        match err {
            Error::SumOverflow { key } => assert_eq!(key, "A"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn first_spelling_wins_and_counts_add_up() {
        let partial = partial_of(b"X;1.0\nX;-2.5\nY;0.0\nX;10.0\n", 257, false).unwrap();
        let hasher = KeyHasher::default();
        let x = hasher.digest(b"X");

        assert_eq!(partial.records(), 4);
        assert_eq!(partial.len(), 2);
        let counted: u64 = partial.iter().map(|(_, a)| a.count).sum();
        assert_eq!(counted, partial.records());
        assert_eq!(partial.name(x), Some(&b"X"[..]));
        assert_eq!(
            partial.get(x),
            Some(&Aggregate {
                count: 3,
                sum: 85,
                min: -25,
                max: 100
            })
        );
    }

    #[test]
    fn colliding_keys_merge_silently_by_default() {
        let data = b"1Copenhagen;1.0\n2Copenhagen;3.0\n";
        let partial = partial_of(data, 256, false).unwrap();
        assert_eq!(partial.len(), 1);

        let digest = KeyHasher::new(256).digest(b"1Copenhagen");
        assert_eq!(partial.name(digest), Some(&b"1Copenhagen"[..]));
        assert_eq!(partial.get(digest).map(|a| a.count), Some(2));
    }

    #[test]
    fn strict_mode_reports_collisions() {
        let data = b"1Copenhagen;1.0\n2Copenhagen;3.0\n";
        let err = partial_of(data, 256, true).unwrap_err();
        match err {
            Error::DigestCollision { first, second, .. } => {
                assert_eq!(first, "1Copenhagen");
                assert_eq!(second, "2Copenhagen");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn parse_errors_stop_the_worker() {
        let err = partial_of(b"Oslo;1.0\nParis;12\nRome;2.0\n", 257, false).unwrap_err();
        assert!(matches!(
            err,
            Error::Malformed {
                offset: 17,
                kind: MalformedKind::MissingDecimalPoint
            }
        ));
    }

    #[test]
    fn cancelled_worker_stops() {
        let data = b"A;1.0\n".repeat(CANCEL_CHECK_INTERVAL as usize + 10);
        let mut reader = ChunkReader::new(&data[..], 0, None, 4096);
        let mut partial = Partial::default();
        let err = partial
            .consume(&mut reader, KeyHasher::default(), false, &AtomicBool::new(true))
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert_eq!(partial.records(), CANCEL_CHECK_INTERVAL);
    }
}
