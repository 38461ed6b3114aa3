//! Record sources: counted, seekable access to an ordered collection of records.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use csv::{ByteRecord, Position, Reader, ReaderBuilder, StringRecord};
use log::debug;

use crate::config::{LoaderConfig, DEFAULT_CHUNK_SIZE};
use crate::error::{NbError, Result};

/// Sequential reader over records, starting at the offset it was opened at.
pub trait RecordCursor {
    /// Raw record type yielded by the cursor.
    type Record;

    /// Returns the next record, or `Ok(None)` once the input is exhausted.
    ///
    /// Reaching the end is a normal terminal signal, never an error.
    fn next_record(&mut self) -> Result<Option<Self::Record>>;
}

/// Ordered, countable collection of records that can be read from any offset.
pub trait RecordSource: Sync {
    /// Raw record type handed to parsers.
    type Record;
    /// Cursor produced by [`RecordSource::read_from`].
    type Cursor: RecordCursor<Record = Self::Record>;

    /// Total number of records, independent of any cursor position.
    fn count(&self) -> Result<usize>;

    /// Opens a cursor positioned at the zero-based record `offset`.
    ///
    /// Every call yields a fresh cursor, regardless of earlier reads. An offset
    /// at or past the end produces a cursor that is immediately exhausted.
    fn read_from(&self, offset: usize) -> Result<Self::Cursor>;

    /// Whether cursors can be opened and drained from several threads at once.
    ///
    /// Sources backed by a single physical cursor return `false`, and the loader
    /// serializes the seek-and-drain step for them.
    fn concurrent_cursors(&self) -> bool {
        true
    }
}

/// Options controlling how a delimited file is tokenised into records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Treats the first row as a header and excludes it from the records.
    pub has_headers: bool,
    /// Records between the byte positions remembered while counting.
    ///
    /// A cursor seeks to the nearest remembered position at or before its
    /// offset and skips fewer than this many records from there.
    pub index_stride: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_headers: false,
            index_stride: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl From<&LoaderConfig> for CsvOptions {
    fn from(cfg: &LoaderConfig) -> Self {
        Self {
            delimiter: cfg.delimiter,
            has_headers: cfg.has_headers,
            index_stride: cfg.chunk_size,
        }
    }
}

/// Record count plus the byte position of every `stride`-th record.
#[derive(Debug)]
struct RecordIndex {
    count: usize,
    stride: usize,
    checkpoints: Vec<Position>,
}

impl RecordIndex {
    /// Nearest checkpoint at or before `offset`, with the record it starts at.
    fn checkpoint_for(&self, offset: usize) -> Option<(usize, &Position)> {
        let slot = (offset / self.stride).min(self.checkpoints.len().checked_sub(1)?);
        Some((slot * self.stride, &self.checkpoints[slot]))
    }
}

/// Delimited file on disk. Every cursor owns its own file handle.
#[derive(Debug)]
pub struct CsvSource {
    path: PathBuf,
    options: CsvOptions,
    index: OnceLock<RecordIndex>,
}

impl CsvSource {
    /// Opens the file at `path`, failing early if it cannot be read.
    pub fn open<P: AsRef<Path>>(path: P, options: CsvOptions) -> Result<Self> {
        let source = Self {
            path: path.as_ref().to_path_buf(),
            options,
            index: OnceLock::new(),
        };
        source.reader()?;
        Ok(source)
    }

    /// Returns the location of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&self) -> Result<Reader<File>> {
        let file = File::open(&self.path)
            .map_err(|err| NbError::source_unavailable(err, Some(self.path.clone())))?;
        Ok(ReaderBuilder::new()
            .delimiter(self.options.delimiter)
            .has_headers(self.options.has_headers)
            .flexible(true)
            .from_reader(file))
    }

    fn csv_error(&self, err: csv::Error, index: usize) -> NbError {
        NbError::from_csv(err, index, Some(self.path.clone()))
    }

    fn index(&self) -> Result<&RecordIndex> {
        if let Some(index) = self.index.get() {
            return Ok(index);
        }
        let stride = self.options.index_stride.max(1);
        let mut reader = self.reader()?;
        if self.options.has_headers {
            reader.byte_headers().map_err(|err| self.csv_error(err, 0))?;
        }
        let mut record = ByteRecord::new();
        let mut checkpoints = Vec::new();
        let mut count = 0usize;
        loop {
            if count % stride == 0 {
                checkpoints.push(reader.position().clone());
            }
            let more = reader
                .read_byte_record(&mut record)
                .map_err(|err| self.csv_error(err, count))?;
            if !more {
                break;
            }
            count += 1;
        }
        debug!(
            "indexed {count} records in {} ({} checkpoints every {stride})",
            self.path.display(),
            checkpoints.len()
        );
        Ok(self.index.get_or_init(|| RecordIndex {
            count,
            stride,
            checkpoints,
        }))
    }
}

impl RecordSource for CsvSource {
    type Record = StringRecord;
    type Cursor = CsvCursor;

    fn count(&self) -> Result<usize> {
        Ok(self.index()?.count)
    }

    fn read_from(&self, offset: usize) -> Result<CsvCursor> {
        let index = self.index()?;
        let mut reader = self.reader()?;
        let mut exhausted = offset >= index.count;
        let mut next = 0;
        if !exhausted {
            if let Some((first, position)) = index.checkpoint_for(offset) {
                reader
                    .seek(position.clone())
                    .map_err(|err| self.csv_error(err, first))?;
                next = first;
            }
        }
        let mut skipped = ByteRecord::new();
        while !exhausted && next < offset {
            exhausted = !reader
                .read_byte_record(&mut skipped)
                .map_err(|err| self.csv_error(err, next))?;
            next += 1;
        }
        Ok(CsvCursor {
            reader,
            path: self.path.clone(),
            index: offset,
            exhausted,
        })
    }
}

/// Cursor over a [`CsvSource`].
#[derive(Debug)]
pub struct CsvCursor {
    reader: Reader<File>,
    path: PathBuf,
    index: usize,
    exhausted: bool,
}

impl RecordCursor for CsvCursor {
    type Record = StringRecord;

    fn next_record(&mut self) -> Result<Option<StringRecord>> {
        if self.exhausted {
            return Ok(None);
        }
        let mut record = StringRecord::new();
        let more = self
            .reader
            .read_record(&mut record)
            .map_err(|err| NbError::from_csv(err, self.index, Some(self.path.clone())))?;
        if !more {
            self.exhausted = true;
            return Ok(None);
        }
        self.index += 1;
        Ok(Some(record))
    }
}

/// Immutable in-memory records shared by every cursor.
#[derive(Debug, Clone)]
pub struct MemorySource<R> {
    records: Arc<[R]>,
}

impl<R> MemorySource<R> {
    /// Wraps the given records.
    #[must_use]
    pub fn new(records: Vec<R>) -> Self {
        Self {
            records: records.into(),
        }
    }

    /// Returns the records in order.
    #[must_use]
    pub fn records(&self) -> &[R] {
        &self.records
    }
}

impl<R> FromIterator<R> for MemorySource<R> {
    fn from_iter<I: IntoIterator<Item = R>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<R> RecordSource for MemorySource<R>
where
    R: Clone + Send + Sync,
{
    type Record = R;
    type Cursor = MemoryCursor<R>;

    fn count(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    fn read_from(&self, offset: usize) -> Result<MemoryCursor<R>> {
        Ok(MemoryCursor {
            records: Arc::clone(&self.records),
            position: offset,
        })
    }
}

/// Cursor over a [`MemorySource`].
#[derive(Debug, Clone)]
pub struct MemoryCursor<R> {
    records: Arc<[R]>,
    position: usize,
}

impl<R: Clone> RecordCursor for MemoryCursor<R> {
    type Record = R;

    fn next_record(&mut self) -> Result<Option<R>> {
        let record = self.records.get(self.position).cloned();
        if record.is_some() {
            self.position += 1;
        }
        Ok(record)
    }
}
