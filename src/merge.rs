use std::collections::hash_map::Entry;

use tracing::warn;

use crate::error::Result;
use crate::worker::{collision, sum_overflow, Partial};

impl Partial {
    /// Folds `other` into `self`, consuming it. Names are only compared when
    /// both sides saw the same digest, once per key.
    pub fn absorb(&mut self, other: Partial, strict: bool) -> Result<()> {
        let Partial {
            aggregates,
            mut names,
            records,
        } = other;
        self.records += records;

        for (digest, stats) in aggregates {
            match self.aggregates.entry(digest) {
                Entry::Occupied(entry) => {
                    let pair = (self.names.get(&digest), names.get(&digest));
                    if let (Some(ours), Some(theirs)) = pair {
                        if ours != theirs {
                            if strict {
                                return Err(collision(digest, ours, theirs));
                            }
                            warn!(
                                digest,
                                kept = %String::from_utf8_lossy(ours),
                                merged = %String::from_utf8_lossy(theirs),
                                "distinct keys share a digest; aggregating them together"
                            );
                        }
                    }
                    if entry.into_mut().merge(&stats).is_none() {
                        let name = self.names.get(&digest).or_else(|| names.get(&digest));
                        return Err(sum_overflow(name.map_or(&[][..], |n| &n[..])));
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(stats);
                    if let Some(name) = names.remove(&digest) {
                        self.names.insert(digest, name);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Combines per-worker results into one. The first partial is the
/// accumulator; the rest are drained into it in order.
pub fn merge<I>(partials: I, strict: bool) -> Result<Partial>
where
    I: IntoIterator<Item = Partial>,
{
    let mut partials = partials.into_iter();
    let Some(mut acc) = partials.next() else {
        return Ok(Partial::default());
    };
    for partial in partials {
        acc.absorb(partial, strict)?;
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::KeyHasher;
    use crate::error::Error;
    use crate::report::Report;

    fn partial(records: &[(&str, i64)], base: u64) -> Partial {
        let hasher = KeyHasher::new(base);
        let mut partial = Partial::default();
        for (key, value) in records {
            partial
                .observe(hasher.digest(key.as_bytes()), key.as_bytes(), *value, false)
                .unwrap();
        }
        partial
    }

    fn abc() -> (Partial, Partial, Partial) {
        (
            partial(&[("Oslo", 15), ("Riga", -20), ("Oslo", -5)], 257),
            partial(&[("Riga", 33), ("Bern", 100)], 257),
            partial(&[("Bern", -100), ("Oslo", 250), ("Lima", 0)], 257),
        )
    }

    #[test]
    fn merge_is_order_independent() {
        let (a, b, c) = abc();
        let abc = merge([a.clone(), b.clone(), c.clone()], false).unwrap();
        let cab = merge([c.clone(), a.clone(), b.clone()], false).unwrap();
        let bca = merge([b, c, a], false).unwrap();

        let expected = Report::from(abc);
        assert_eq!(expected, Report::from(cab));
        assert_eq!(expected, Report::from(bca));

        assert_eq!(
            expected.to_string(),
            "{Bern=-10.0/0.0/10.0, Lima=0.0/0.0/0.0, Oslo=-0.5/8.7/25.0, Riga=-2.0/0.7/3.3}"
        );
    }

    #[test]
    fn merge_sums_counts_and_records() {
        let (a, b, c) = abc();
        let merged = merge([a, b, c], false).unwrap();
        let oslo = KeyHasher::default().digest(b"Oslo");

        assert_eq!(merged.records(), 8);
        assert_eq!(merged.len(), 4);
        let counted: u64 = merged.iter().map(|(_, stats)| stats.count).sum();
        assert_eq!(counted, merged.records());
        let stats = merged.get(oslo).unwrap();
        assert_eq!((stats.count, stats.sum, stats.min, stats.max), (3, 260, -5, 250));
        assert_eq!(merged.name(oslo), Some(&b"Oslo"[..]));
    }

    #[test]
    fn merging_nothing_is_empty() {
        let merged = merge(Vec::new(), false).unwrap();
        assert!(merged.is_empty());
        assert_eq!(merged.records(), 0);
    }

    #[test]
    fn merged_sum_overflow_is_an_error() {
        let big = 9_000_000_000_000_000_000;
        let a = partial(&[("Oslo", 10), ("Apia", big)], 257);
        let b = partial(&[("Apia", big)], 257);

        let err = merge([a, b], false).unwrap_err();
        match err {
            Error::SumOverflow { key } => assert_eq!(key, "Apia"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn cross_worker_collisions() {
        let a = partial(&[("1Copenhagen", 10)], 256);
        let b = partial(&[("2Copenhagen", 30)], 256);

        let merged = merge([a.clone(), b.clone()], false).unwrap();
        assert_eq!(merged.len(), 1);

        let err = merge([a, b], true).unwrap_err();
        assert!(matches!(err, Error::DigestCollision { .. }));
    }
}
