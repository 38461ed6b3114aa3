//! Parsed samples and the in-memory batches produced by chunk reads.

use serde::{Deserialize, Serialize};

/// Integer feature value carried inside a feature group.
pub type FeatureValue = i32;
/// Integer class label attached to every sample.
pub type ClassLabel = u16;

/// One parsed record: ordered feature groups plus a class label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    feature_groups: Vec<Vec<FeatureValue>>,
    class: ClassLabel,
}

impl Sample {
    /// Creates a sample from its feature groups and class label.
    #[must_use]
    pub fn new(feature_groups: Vec<Vec<FeatureValue>>, class: ClassLabel) -> Self {
        Self {
            feature_groups,
            class,
        }
    }

    /// Returns the nested feature groups in record order.
    #[must_use]
    pub fn feature_groups(&self) -> &[Vec<FeatureValue>] {
        &self.feature_groups
    }

    /// Returns the class label.
    #[must_use]
    pub fn class(&self) -> ClassLabel {
        self.class
    }

    /// Iterates every feature value across all groups.
    pub fn features(&self) -> impl Iterator<Item = FeatureValue> + '_ {
        self.feature_groups.iter().flatten().copied()
    }

    /// Total number of feature values across all groups.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.feature_groups.iter().map(Vec::len).sum()
    }
}

/// Ordered batch of samples read from a contiguous run of records.
///
/// A dataset is produced by one chunk read and consumed by value when it is
/// aggregated, so no batch outlives the worker that read it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    /// Creates an empty dataset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty dataset with room for `capacity` samples.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Appends a sample.
    pub fn push(&mut self, sample: Sample) {
        self.samples.push(sample);
    }

    /// Number of samples in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` when the batch holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Returns the samples in read order.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Iterates the samples in read order.
    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }
}

impl FromIterator<Sample> for Dataset {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Dataset {
    type Item = Sample;
    type IntoIter = std::vec::IntoIter<Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.into_iter()
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}
