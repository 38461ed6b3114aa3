//! Partitioning of a record stream into fixed-size chunks.

use serde::{Deserialize, Serialize};

use crate::error::{NbError, Result};

/// Contiguous run of records assigned to one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkSpec {
    /// Zero-based chunk number.
    pub index: usize,
    /// Absolute index of the first record in the chunk.
    pub offset: usize,
    /// Number of records planned for the chunk.
    pub size: usize,
}

impl ChunkSpec {
    /// Absolute index one past the last planned record.
    #[must_use]
    pub fn end(&self) -> usize {
        self.offset + self.size
    }
}

/// Derived split of `total_records` into chunks of `chunk_size`.
///
/// The plan holds `ceil(total / chunk_size)` chunks; every chunk except the
/// last is full, and the last holds the remainder when there is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPlan {
    total_records: usize,
    chunk_size: usize,
}

impl ChunkPlan {
    /// Plans `total_records` records in chunks of `chunk_size`.
    pub fn new(total_records: usize, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(NbError::InvalidConfig(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if total_records == 0 {
            return Err(NbError::EmptySource);
        }
        Ok(Self {
            total_records,
            chunk_size,
        })
    }

    /// Total number of records covered by the plan.
    #[must_use]
    pub fn total_records(&self) -> usize {
        self.total_records
    }

    /// Configured records per chunk.
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Number of chunks in the plan.
    #[must_use]
    pub fn num_chunks(&self) -> usize {
        self.total_records.div_ceil(self.chunk_size)
    }

    /// Size of the final chunk.
    #[must_use]
    pub fn last_chunk_size(&self) -> usize {
        match self.total_records % self.chunk_size {
            0 => self.chunk_size,
            remainder => remainder,
        }
    }

    /// Returns the chunk at `index`, if the plan has one.
    #[must_use]
    pub fn chunk(&self, index: usize) -> Option<ChunkSpec> {
        (index < self.num_chunks()).then(|| self.spec_at(index))
    }

    /// Iterates the chunks in offset order.
    pub fn chunks(&self) -> impl ExactSizeIterator<Item = ChunkSpec> + '_ {
        (0..self.num_chunks()).map(move |index| self.spec_at(index))
    }

    fn spec_at(&self, index: usize) -> ChunkSpec {
        let size = if index + 1 == self.num_chunks() {
            self.last_chunk_size()
        } else {
            self.chunk_size
        };
        ChunkSpec {
            index,
            offset: index * self.chunk_size,
            size,
        }
    }
}
