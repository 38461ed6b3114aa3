//! Error handling utilities shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result type used throughout the crate.
pub type Result<T, E = NbError> = std::result::Result<T, E>;

/// Domain-specific error describing failures while planning, reading, or merging a load.
#[derive(Debug, Error)]
pub enum NbError {
    /// Loader configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The record source could not be opened, read, or positioned.
    #[error("record source {path:?} is unavailable: {source}")]
    SourceUnavailable {
        /// Underlying IO error returned by the standard library or the CSV reader.
        source: std::io::Error,
        /// Location of the source if it lives on disk.
        path: Option<PathBuf>,
    },
    /// A record could not be decoded into a sample; the whole load is rejected.
    #[error("malformed record at index {index}: {reason}")]
    MalformedRecord {
        /// Absolute, zero-based index of the offending record.
        index: usize,
        /// What was wrong with the record.
        #[source]
        reason: RecordError,
    },
    /// The source holds no records at all.
    #[error("record source contains no records")]
    EmptySource,
    /// The merger was handed an empty collection of tables.
    #[error("no frequency tables to combine")]
    NoTables,
    /// A textual frequency key did not match `class` or `class|feature`.
    #[error("invalid frequency key {0:?}")]
    InvalidKey(String),
    /// Catch-all variant for invariants that should not occur.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Reason a single raw record was rejected by a parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The record has fewer fields than the parser reads.
    #[error("expected at least {expected} fields, found {found}")]
    MissingField {
        /// Number of fields the parser needs.
        expected: usize,
        /// Number of fields present in the record.
        found: usize,
    },
    /// The feature field is not a nested array of integers.
    #[error("feature groups are not well-formed: {0}")]
    FeatureEncoding(String),
    /// The class field is not an integer-like token.
    #[error("class label {0:?} is not an integer")]
    ClassLabel(String),
    /// The raw record could not be decoded as delimited text.
    #[error("record could not be decoded: {0}")]
    Encoding(String),
}

impl NbError {
    /// Helper constructor that attaches an optional path when wrapping IO errors.
    pub fn source_unavailable(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::SourceUnavailable { source, path }
    }

    /// Helper constructor pairing a record index with its rejection reason.
    pub fn malformed(index: usize, reason: RecordError) -> Self {
        Self::MalformedRecord { index, reason }
    }

    /// Classifies a CSV reader failure: IO problems make the source unavailable,
    /// everything else is a defect of the record at `index`.
    pub(crate) fn from_csv(err: csv::Error, index: usize, path: Option<PathBuf>) -> Self {
        if err.is_io_error() {
            Self::source_unavailable(std::io::Error::from(err), path)
        } else {
            Self::malformed(index, RecordError::Encoding(err.to_string()))
        }
    }

    /// Returns the record index for [`NbError::MalformedRecord`] failures.
    #[must_use]
    pub fn record_index(&self) -> Option<usize> {
        match self {
            Self::MalformedRecord { index, .. } => Some(*index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_record_message_names_index_and_reason() {
        let err = NbError::malformed(7, RecordError::ClassLabel("x".into()));
        assert_eq!(
            err.to_string(),
            "malformed record at index 7: class label \"x\" is not an integer"
        );
        assert_eq!(err.record_index(), Some(7));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn record_index_absent_for_other_variants() {
        assert_eq!(NbError::EmptySource.record_index(), None);
        assert_eq!(NbError::NoTables.record_index(), None);
    }
}
