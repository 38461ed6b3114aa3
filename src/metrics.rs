//! Metrics describing how a load was split and how each chunk fared.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::reader::ChunkStatus;

/// Metrics captured for each chunk worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetrics {
    /// Zero-based chunk number.
    pub index: usize,
    /// Absolute index of the chunk's first record.
    pub offset: usize,
    /// Number of samples actually read.
    pub records: usize,
    /// Whether the read stopped at the end of the input.
    pub status: ChunkStatus,
    /// Distinct keys in the chunk's partial table.
    pub distinct_keys: usize,
    /// Time spent reading, parsing, and counting the chunk.
    pub elapsed: Duration,
}

/// Aggregate metrics produced by a load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoadMetrics {
    /// Records reported by the source.
    pub total_records: usize,
    /// Configured records per chunk.
    pub chunk_size: usize,
    /// Per-chunk snapshots ordered by chunk index.
    pub chunks: Vec<ChunkMetrics>,
    /// Distinct keys in the merged table.
    pub distinct_keys: usize,
    /// Total duration of the load.
    pub total_duration: Duration,
    /// Resident set size sample captured from `/proc/self/status` on Linux.
    pub rss_kb: Option<usize>,
}

impl LoadMetrics {
    /// Creates an empty metrics container with room for `capacity` chunks.
    #[must_use]
    pub fn new(total_records: usize, chunk_size: usize, capacity: usize) -> Self {
        Self {
            total_records,
            chunk_size,
            chunks: Vec::with_capacity(capacity),
            distinct_keys: 0,
            total_duration: Duration::ZERO,
            rss_kb: None,
        }
    }

    /// Number of samples read across all chunks.
    #[must_use]
    pub fn records_read(&self) -> usize {
        self.chunks.iter().map(|chunk| chunk.records).sum()
    }

    /// Samples the resident set size into [`LoadMetrics::rss_kb`].
    ///
    /// The loader calls this once the merged table is built, so comparing
    /// samples across runs shows the memory cost of a given chunk size.
    pub fn capture_rss(&mut self) {
        self.rss_kb = resident_set_kb();
    }
}

/// Reads `VmRSS` from `/proc/self/status`.
#[cfg(target_os = "linux")]
fn resident_set_kb() -> Option<usize> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let file = File::open("/proc/self/status").ok()?;
    BufReader::new(file)
        .lines()
        .map_while(std::result::Result::ok)
        .find_map(|line| {
            line.strip_prefix("VmRSS:")?
                .split_whitespace()
                .find_map(|part| part.parse::<usize>().ok())
        })
}

#[cfg(not(target_os = "linux"))]
fn resident_set_kb() -> Option<usize> {
    None
}
