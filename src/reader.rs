//! Reading one chunk of records into a [`Dataset`].

use serde::{Deserialize, Serialize};

use crate::error::{NbError, Result};
use crate::parser::RecordParser;
use crate::sample::Dataset;
use crate::source::{RecordCursor, RecordSource};

/// How a chunk read ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStatus {
    /// All requested records were read.
    Complete,
    /// The input ended before the requested number of records.
    EndOfInput,
}

/// Reads up to `size` records starting at `offset` and parses them.
///
/// Hitting the end of the input returns the records read so far with
/// [`ChunkStatus::EndOfInput`]. A single malformed record rejects the whole
/// chunk with [`NbError::MalformedRecord`] carrying its absolute index.
pub fn read_chunk<S, P>(
    source: &S,
    parser: &P,
    offset: usize,
    size: usize,
) -> Result<(Dataset, ChunkStatus)>
where
    S: RecordSource + ?Sized,
    P: RecordParser<S::Record> + ?Sized,
{
    let (raw, status) = drain_chunk(source, offset, size)?;
    let dataset = parse_chunk(parser, offset, &raw)?;
    Ok((dataset, status))
}

/// Seeks to `offset` and buffers up to `size` raw records without parsing them.
pub fn drain_chunk<S>(
    source: &S,
    offset: usize,
    size: usize,
) -> Result<(Vec<S::Record>, ChunkStatus)>
where
    S: RecordSource + ?Sized,
{
    let mut cursor = source.read_from(offset)?;
    let mut raw = Vec::with_capacity(size.min(64 * 1024));
    while raw.len() < size {
        match cursor.next_record()? {
            Some(record) => raw.push(record),
            None => return Ok((raw, ChunkStatus::EndOfInput)),
        }
    }
    Ok((raw, ChunkStatus::Complete))
}

/// Parses buffered records whose first element sits at absolute index `offset`.
pub fn parse_chunk<R, P>(parser: &P, offset: usize, raw: &[R]) -> Result<Dataset>
where
    P: RecordParser<R> + ?Sized,
{
    let mut dataset = Dataset::with_capacity(raw.len());
    for (position, record) in raw.iter().enumerate() {
        let sample = parser
            .parse(record)
            .map_err(|reason| NbError::malformed(offset + position, reason))?;
        dataset.push(sample);
    }
    Ok(dataset)
}
