use std::fmt;

use crate::worker::{Aggregate, Partial};

/// Final per-key statistics, sorted by key.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Report {
    stations: Vec<(String, Aggregate)>,
}

impl Report {
    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Aggregate> {
        self.stations
            .binary_search_by(|(name, _)| name.as_str().cmp(key))
            .ok()
            .map(|i| &self.stations[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Aggregate)> {
        self.stations.iter().map(|(name, stats)| (name.as_str(), stats))
    }
}

impl From<Partial> for Report {
    fn from(partial: Partial) -> Self {
        let Partial {
            aggregates,
            mut names,
            ..
        } = partial;

        let mut stations: Vec<(String, Aggregate)> = aggregates
            .into_iter()
            .map(|(digest, stats)| {
                let name = match names.remove(&digest) {
                    Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
                    None => format!("{:#018x}", digest),
                };
                (name, stats)
            })
            .collect();
        stations.sort_unstable_by(|a, b| a.0.cmp(&b.0));

        Self { stations }
    }
}

/// `{Berlin=-3.2/-3.2/-3.2, Hamburg=8.5/10.3/12.0}`
impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (station, stats)) in self.stations.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", station, stats)?;
        }
        f.write_str("}")
    }
}
