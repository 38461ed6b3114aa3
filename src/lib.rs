//! Chunked, parallel loading of labeled datasets into Naive Bayes frequency tables.
//!
//! The crate exposes both a library API and a `fastnb` command line interface.
//! A load counts the records of a delimited file, splits them into fixed-size
//! chunks, reads and counts every chunk on its own Rayon worker, and merges
//! the partial tables into one [`FrequencyTable`] of class and
//! `class|feature` occurrence counts.
//!
//! ```no_run
//! use fastnb::{Loader, LoaderConfig};
//!
//! # fn main() -> fastnb::Result<()> {
//! let cfg = LoaderConfig::builder()
//!     .source_path("data.csv")
//!     .chunk_size(4096)
//!     .build()?;
//! let artifacts = Loader::new(cfg).load()?;
//! println!("{} keys, {} classes", artifacts.table.len(), artifacts.table.classes().len());
//! # Ok(())
//! # }
//! ```
//!
//! Any [`RecordSource`] can be paired with any [`RecordParser`] for its record
//! type through [`Loader::load_from_source`]; closures are parsers too.
//!
//! The CLI is enabled by default through the `cli` feature.  Users targeting the
//! library portion only can disable default features to avoid the CLI
//! dependencies: `fastnb = { version = "...", default-features = false }`.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    clippy::all,
    rust_2018_idioms,
    future_incompatible,
    unused_lifetimes,
    unreachable_pub
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::multiple_crate_versions
)]

pub mod chunk;
pub mod config;
pub mod error;
pub mod frequency;
pub mod loader;
pub mod metrics;
pub mod parser;
pub mod reader;
pub mod sample;
pub mod source;

pub use chunk::{ChunkPlan, ChunkSpec};
pub use config::{ClassCounting, LoaderBuilder, LoaderConfig, ReadStrategy};
pub use error::{NbError, RecordError, Result};
pub use frequency::{aggregate, combine, CountKey, FrequencyTable};
pub use loader::{load, LoadArtifacts, LoadState, Loader};
pub use metrics::{ChunkMetrics, LoadMetrics};
pub use parser::{DelimitedParser, RecordParser};
pub use reader::{read_chunk, ChunkStatus};
pub use sample::{ClassLabel, Dataset, FeatureValue, Sample};
pub use source::{CsvOptions, CsvSource, MemorySource, RecordCursor, RecordSource};
