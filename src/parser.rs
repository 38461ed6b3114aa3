//! Decoding of raw records into [`Sample`]s.

use csv::StringRecord;

use crate::error::RecordError;
use crate::sample::{ClassLabel, FeatureValue, Sample};

/// Decodes one raw record into a [`Sample`].
///
/// Parsers are shared by every worker of a load, so implementations must be
/// `Sync` and must not rely on mutable state. Any closure of the form
/// `Fn(&R) -> Result<Sample, RecordError> + Sync` is a parser.
pub trait RecordParser<R: ?Sized>: Sync {
    /// Parses `raw`, reporting why it was rejected on failure.
    fn parse(&self, raw: &R) -> Result<Sample, RecordError>;
}

impl<R, F> RecordParser<R> for F
where
    R: ?Sized,
    F: Fn(&R) -> Result<Sample, RecordError> + Sync,
{
    fn parse(&self, raw: &R) -> Result<Sample, RecordError> {
        self(raw)
    }
}

/// Parser for delimited records holding a JSON feature field and a textual class field.
///
/// With the default field layout a record looks like `"[[1,2],[3]]",0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimitedParser {
    features_field: usize,
    class_field: usize,
}

impl Default for DelimitedParser {
    fn default() -> Self {
        Self {
            features_field: 0,
            class_field: 1,
        }
    }
}

impl DelimitedParser {
    /// Creates a parser reading features and class from the given field indices.
    #[must_use]
    pub fn new(features_field: usize, class_field: usize) -> Self {
        Self {
            features_field,
            class_field,
        }
    }

    fn required_fields(&self) -> usize {
        self.features_field.max(self.class_field) + 1
    }
}

impl RecordParser<StringRecord> for DelimitedParser {
    fn parse(&self, raw: &StringRecord) -> Result<Sample, RecordError> {
        let missing = || RecordError::MissingField {
            expected: self.required_fields(),
            found: raw.len(),
        };
        let features = raw.get(self.features_field).ok_or_else(missing)?;
        let class = raw.get(self.class_field).ok_or_else(missing)?;
        Ok(Sample::new(
            parse_feature_groups(features)?,
            parse_class_label(class)?,
        ))
    }
}

/// Parses a JSON array of integer arrays such as `[[1,2],[3]]`.
pub fn parse_feature_groups(text: &str) -> Result<Vec<Vec<FeatureValue>>, RecordError> {
    serde_json::from_str(text.trim()).map_err(|err| RecordError::FeatureEncoding(err.to_string()))
}

/// Parses an integer class label, tolerating surrounding whitespace.
pub fn parse_class_label(text: &str) -> Result<ClassLabel, RecordError> {
    text.trim()
        .parse::<ClassLabel>()
        .map_err(|_| RecordError::ClassLabel(text.to_string()))
}
