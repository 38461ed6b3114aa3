//! Frequency tables: the class and (class, feature) counts behind Naive Bayes training.

use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;
use serde::ser::{Serialize, Serializer};

use crate::config::ClassCounting;
use crate::error::{NbError, Result};
use crate::sample::{ClassLabel, Dataset, FeatureValue};

/// Separator between class and feature in textual composite keys, read as "given".
pub const KEY_SEPARATOR: char = '|';

/// Key of a [`FrequencyTable`] entry.
///
/// Renders as `class` for bare class keys and `class|feature` for composite keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CountKey {
    /// Occurrences attributed to a class.
    Class(ClassLabel),
    /// Occurrences of `feature` under `class`.
    Feature {
        /// Class the feature was observed under.
        class: ClassLabel,
        /// Observed feature value.
        feature: FeatureValue,
    },
}

impl CountKey {
    /// Returns the class the key belongs to.
    #[must_use]
    pub fn class(&self) -> ClassLabel {
        match *self {
            Self::Class(class) | Self::Feature { class, .. } => class,
        }
    }

    fn sort_key(&self) -> (ClassLabel, Option<FeatureValue>) {
        match *self {
            Self::Class(class) => (class, None),
            Self::Feature { class, feature } => (class, Some(feature)),
        }
    }
}

impl fmt::Display for CountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(class) => write!(f, "{class}"),
            Self::Feature { class, feature } => write!(f, "{class}{KEY_SEPARATOR}{feature}"),
        }
    }
}

impl FromStr for CountKey {
    type Err = NbError;

    fn from_str(text: &str) -> Result<Self> {
        let invalid = || NbError::InvalidKey(text.to_string());
        match text.split_once(KEY_SEPARATOR) {
            None => text.parse().map(Self::Class).map_err(|_| invalid()),
            Some((class, feature)) => Ok(Self::Feature {
                class: class.parse().map_err(|_| invalid())?,
                feature: feature.parse().map_err(|_| invalid())?,
            }),
        }
    }
}

/// Mapping from [`CountKey`] to occurrence counts.
///
/// Every composite key is backed by a bare class key whose count is at least
/// the composite count, as long as tables are only built through
/// [`aggregate`] and [`combine`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: FxHashMap<CountKey, u64>,
}

impl FrequencyTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns `true` when no key has been counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Count stored for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &CountKey) -> Option<u64> {
        self.counts.get(key).copied()
    }

    /// Count of the bare class key, zero when absent.
    #[must_use]
    pub fn class_count(&self, class: ClassLabel) -> u64 {
        self.get(&CountKey::Class(class)).unwrap_or(0)
    }

    /// Count of `feature` under `class`, zero when absent.
    #[must_use]
    pub fn feature_count(&self, class: ClassLabel, feature: FeatureValue) -> u64 {
        self.get(&CountKey::Feature { class, feature }).unwrap_or(0)
    }

    /// Iterates entries in arbitrary order.
    pub fn iter(&self) -> impl Iterator<Item = (&CountKey, &u64)> + '_ {
        self.counts.iter()
    }

    /// Entries ordered by class, with each bare class key before its features.
    #[must_use]
    pub fn sorted_entries(&self) -> Vec<(CountKey, u64)> {
        let mut entries: Vec<_> = self.counts.iter().map(|(&k, &v)| (k, v)).collect();
        entries.sort_unstable_by_key(|(key, _)| key.sort_key());
        entries
    }

    /// Distinct classes with a bare key, in ascending order.
    #[must_use]
    pub fn classes(&self) -> Vec<ClassLabel> {
        let mut classes: Vec<_> = self
            .counts
            .keys()
            .filter_map(|key| match key {
                CountKey::Class(class) => Some(*class),
                CountKey::Feature { .. } => None,
            })
            .collect();
        classes.sort_unstable();
        classes
    }

    /// Adds `amount` to `key`.
    pub fn add(&mut self, key: CountKey, amount: u64) {
        *self.counts.entry(key).or_insert(0) += amount;
    }

    /// Folds every count of `other` into `self`.
    pub fn absorb(&mut self, mut other: FrequencyTable) {
        if other.counts.len() > self.counts.len() {
            std::mem::swap(&mut self.counts, &mut other.counts);
        }
        for (key, count) in other.counts {
            self.add(key, count);
        }
    }
}

impl Serialize for FrequencyTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(
            self.sorted_entries()
                .into_iter()
                .map(|(key, count)| (key.to_string(), count)),
        )
    }
}

/// Counts one batch of samples.
///
/// Every feature value increments its `class|feature` key. The bare class key
/// is incremented per feature value or per sample depending on `counting`.
/// An empty dataset yields an empty table.
#[must_use]
pub fn aggregate(dataset: Dataset, counting: ClassCounting) -> FrequencyTable {
    let mut table = FrequencyTable::new();
    for sample in dataset {
        let class = sample.class();
        let mut seen = 0u64;
        for feature in sample.features() {
            table.add(CountKey::Feature { class, feature }, 1);
            seen += 1;
        }
        let class_increment = match counting {
            ClassCounting::PerFeature => seen,
            ClassCounting::PerSample => 1,
        };
        if class_increment > 0 {
            table.add(CountKey::Class(class), class_increment);
        }
    }
    table
}

/// Sums tables key by key.
///
/// The result holds the union of all keys and does not depend on the order of
/// `tables`. An empty collection is reported as [`NbError::NoTables`], which is
/// distinct from combining tables that happen to be empty.
pub fn combine<I>(tables: I) -> Result<FrequencyTable>
where
    I: IntoIterator<Item = FrequencyTable>,
{
    let mut tables = tables.into_iter();
    let mut merged = tables.next().ok_or(NbError::NoTables)?;
    for table in tables {
        merged.absorb(table);
    }
    Ok(merged)
}
