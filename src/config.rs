//! Configuration builders controlling how datasets are chunked and loaded.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{NbError, Result};

/// Records per chunk when nothing else is configured.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// How chunk workers obtain their raw records.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReadStrategy {
    /// Every worker opens its own cursor and reads concurrently.
    #[default]
    Independent,
    /// One lock guards seek-and-drain; parsing and counting stay parallel.
    Serialized,
}

/// What a bare class key counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClassCounting {
    /// One increment per feature value seen under the class.
    #[default]
    PerFeature,
    /// One increment per sample carrying the class.
    PerSample,
}

/// Configuration for a chunked dataset load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Location of the delimited record file.
    pub source_path: PathBuf,
    /// Number of records assigned to each worker; must be positive.
    pub chunk_size: usize,
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Skips a header row when `true`.
    pub has_headers: bool,
    /// Index of the field holding the JSON-encoded feature groups.
    pub features_field: usize,
    /// Index of the field holding the class label.
    pub class_field: usize,
    /// Cursor sharing policy for chunk reads.
    pub read_strategy: ReadStrategy,
    /// Size of a dedicated worker pool; `None` uses the global Rayon pool.
    pub threads: Option<usize>,
    /// Semantics of the bare class key.
    pub class_counting: ClassCounting,
    /// Enables plan and summary logging through the `log` facade.
    pub show_progress: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from("data.csv"),
            chunk_size: DEFAULT_CHUNK_SIZE,
            delimiter: b',',
            has_headers: false,
            features_field: 0,
            class_field: 1,
            read_strategy: ReadStrategy::Independent,
            threads: None,
            class_counting: ClassCounting::PerFeature,
            show_progress: false,
        }
    }
}

impl LoaderConfig {
    /// Returns a builder initialised with [`LoaderConfig::default`].
    #[must_use]
    pub fn builder() -> LoaderBuilder {
        LoaderBuilder::default()
    }

    /// Reads a JSON configuration file; absent fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|err| {
            NbError::InvalidConfig(format!("cannot read config {}: {err}", path.display()))
        })?;
        let cfg: Self = serde_json::from_str(&text).map_err(|err| {
            NbError::InvalidConfig(format!("cannot parse config {}: {err}", path.display()))
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates the invariants required for loading.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(NbError::InvalidConfig(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if self.threads == Some(0) {
            return Err(NbError::InvalidConfig(
                "threads must be greater than zero when set".into(),
            ));
        }
        if self.features_field == self.class_field {
            return Err(NbError::InvalidConfig(format!(
                "features_field and class_field must differ (both are {})",
                self.class_field
            )));
        }
        if self.source_path.as_os_str().is_empty() {
            return Err(NbError::InvalidConfig(
                "source_path must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`LoaderConfig`].
#[derive(Debug, Default, Clone)]
pub struct LoaderBuilder {
    cfg: LoaderConfig,
}

impl LoaderBuilder {
    /// Creates a builder with [`LoaderConfig::default`] settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the record file to load.
    #[must_use]
    pub fn source_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cfg.source_path = path.into();
        self
    }

    /// Sets the number of records per chunk.
    #[must_use]
    pub fn chunk_size(mut self, value: usize) -> Self {
        self.cfg.chunk_size = value;
        self
    }

    /// Sets the field delimiter.
    #[must_use]
    pub fn delimiter(mut self, value: u8) -> Self {
        self.cfg.delimiter = value;
        self
    }

    /// Enables or disables header row skipping.
    #[must_use]
    pub fn has_headers(mut self, enabled: bool) -> Self {
        self.cfg.has_headers = enabled;
        self
    }

    /// Sets the feature and class field indices.
    #[must_use]
    pub fn fields(mut self, features_field: usize, class_field: usize) -> Self {
        self.cfg.features_field = features_field;
        self.cfg.class_field = class_field;
        self
    }

    /// Selects how workers obtain raw records.
    #[must_use]
    pub fn read_strategy(mut self, strategy: ReadStrategy) -> Self {
        self.cfg.read_strategy = strategy;
        self
    }

    /// Runs the load on a dedicated pool of `value` workers.
    #[must_use]
    pub fn threads(mut self, value: Option<usize>) -> Self {
        self.cfg.threads = value;
        self
    }

    /// Selects what the bare class key counts.
    #[must_use]
    pub fn class_counting(mut self, counting: ClassCounting) -> Self {
        self.cfg.class_counting = counting;
        self
    }

    /// Enables or disables progress logging.
    #[must_use]
    pub fn show_progress(mut self, enabled: bool) -> Self {
        self.cfg.show_progress = enabled;
        self
    }

    /// Finalises the builder, returning a validated [`LoaderConfig`].
    pub fn build(self) -> Result<LoaderConfig> {
        self.cfg.validate()?;
        Ok(self.cfg)
    }
}
