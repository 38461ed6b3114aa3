//! Coordinator that plans chunks, runs them in parallel, and merges their tables.

use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Instant;

use log::{debug, info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use crate::chunk::{ChunkPlan, ChunkSpec};
use crate::config::{LoaderBuilder, LoaderConfig, ReadStrategy};
use crate::error::{NbError, Result};
use crate::frequency::{aggregate, combine, FrequencyTable};
use crate::metrics::{ChunkMetrics, LoadMetrics};
use crate::parser::{DelimitedParser, RecordParser};
use crate::reader::{drain_chunk, parse_chunk, ChunkStatus};
use crate::source::{CsvOptions, CsvSource, RecordSource};

/// Loads the configured delimited file into one merged [`FrequencyTable`].
///
/// Either every chunk is read and merged, or the first error observed is
/// returned and all partial work is discarded.
pub fn load(cfg: &LoaderConfig) -> Result<FrequencyTable> {
    Loader::new(cfg.clone()).load().map(|artifacts| artifacts.table)
}

/// Phases a load moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Counting records and computing the chunk plan.
    Planning,
    /// Launching one worker per chunk.
    Dispatching,
    /// Waiting for every worker and checking for failures.
    Collecting,
    /// All chunk tables were merged.
    Merged,
    /// A failure was surfaced; no table is produced.
    Failed,
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Planning => "planning",
            Self::Dispatching => "dispatching",
            Self::Collecting => "collecting",
            Self::Merged => "merged",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// High-level façade configuring and executing chunked loads.
#[derive(Debug, Clone)]
pub struct Loader {
    cfg: LoaderConfig,
}

/// Artifacts returned after a load completes.
#[must_use]
#[derive(Debug, Clone)]
pub struct LoadArtifacts {
    /// Merged counts over every record.
    pub table: FrequencyTable,
    /// Plan and per-chunk metrics captured during the load.
    pub metrics: LoadMetrics,
}

struct ChunkOutcome {
    table: FrequencyTable,
    metrics: ChunkMetrics,
}

struct Progress {
    state: LoadState,
}

impl Progress {
    fn new() -> Self {
        debug!("load state: {}", LoadState::Planning);
        Self {
            state: LoadState::Planning,
        }
    }

    fn advance(&mut self, next: LoadState) {
        debug!("load state: {} -> {next}", self.state);
        self.state = next;
    }

    fn fail(&mut self, err: NbError) -> NbError {
        warn!("load failed while {}: {err}", self.state);
        self.advance(LoadState::Failed);
        err
    }
}

impl Loader {
    /// Creates a new loader for the supplied configuration.
    #[must_use]
    pub fn new(cfg: LoaderConfig) -> Self {
        Self { cfg }
    }

    /// Returns a [`LoaderBuilder`] with default settings.
    #[must_use]
    pub fn builder() -> LoaderBuilder {
        LoaderConfig::builder()
    }

    /// Returns an immutable reference to the underlying configuration.
    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.cfg
    }

    /// Opens [`LoaderConfig::source_path`] as a delimited file and loads it.
    pub fn load(&self) -> Result<LoadArtifacts> {
        self.cfg.validate()?;
        let source = CsvSource::open(&self.cfg.source_path, CsvOptions::from(&self.cfg))?;
        let parser = DelimitedParser::new(self.cfg.features_field, self.cfg.class_field);
        self.execute(&source, &parser)
    }

    /// Loads any record source with any parser for its record type.
    pub fn load_from_source<S, P>(&self, source: &S, parser: &P) -> Result<LoadArtifacts>
    where
        S: RecordSource + ?Sized,
        P: RecordParser<S::Record> + ?Sized,
    {
        self.cfg.validate()?;
        self.execute(source, parser)
    }

    // Callers validate the configuration first.
    fn execute<S, P>(&self, source: &S, parser: &P) -> Result<LoadArtifacts>
    where
        S: RecordSource + ?Sized,
        P: RecordParser<S::Record> + ?Sized,
    {
        let mut progress = Progress::new();
        self.run(&mut progress, source, parser)
            .map_err(|err| progress.fail(err))
    }

    fn run<S, P>(
        &self,
        progress: &mut Progress,
        source: &S,
        parser: &P,
    ) -> Result<LoadArtifacts>
    where
        S: RecordSource + ?Sized,
        P: RecordParser<S::Record> + ?Sized,
    {
        let start = Instant::now();
        let plan = ChunkPlan::new(source.count()?, self.cfg.chunk_size)?;
        let serialize_reads =
            self.cfg.read_strategy == ReadStrategy::Serialized || !source.concurrent_cursors();
        if self.cfg.show_progress {
            info!(
                "planned {} records in {} chunks of {} (last {}){}",
                plan.total_records(),
                plan.num_chunks(),
                plan.chunk_size(),
                plan.last_chunk_size(),
                if serialize_reads { ", serialized reads" } else { "" }
            );
        }

        progress.advance(LoadState::Dispatching);
        let specs: Vec<ChunkSpec> = plan.chunks().collect();
        let read_lock = Mutex::new(());
        let first_error: OnceLock<NbError> = OnceLock::new();
        let outcomes = {
            let dispatch = || {
                specs
                    .par_iter()
                    .map(|&chunk| {
                        if first_error.get().is_some() {
                            debug!("skipping chunk {} after an earlier failure", chunk.index);
                            return None;
                        }
                        let read_guard = serialize_reads.then_some(&read_lock);
                        match self.run_chunk(source, parser, &plan, chunk, read_guard) {
                            Ok(outcome) => Some(outcome),
                            Err(err) => {
                                debug!("chunk {} failed: {err}", chunk.index);
                                let _ = first_error.set(err);
                                None
                            }
                        }
                    })
                    .collect::<Vec<_>>()
            };
            match self.cfg.threads {
                Some(threads) => ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|index| format!("fastnb-chunk-{index}"))
                    .build()
                    .map_err(|err| {
                        NbError::Internal(format!("unable to build worker pool: {err}"))
                    })?
                    .install(dispatch),
                None => dispatch(),
            }
        };

        progress.advance(LoadState::Collecting);
        if let Some(err) = first_error.into_inner() {
            return Err(err);
        }
        let mut metrics = LoadMetrics::new(plan.total_records(), plan.chunk_size(), specs.len());
        let mut tables = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            let outcome = outcome.ok_or_else(|| {
                NbError::Internal("chunk produced neither a table nor an error".into())
            })?;
            metrics.chunks.push(outcome.metrics);
            tables.push(outcome.table);
        }

        let table = combine(tables)?;
        progress.advance(LoadState::Merged);
        metrics.distinct_keys = table.len();
        metrics.total_duration = start.elapsed();
        metrics.capture_rss();
        if self.cfg.show_progress {
            info!(
                "merged {} chunks: records={} classes={} keys={} duration={:.2?}",
                metrics.chunks.len(),
                metrics.records_read(),
                table.classes().len(),
                metrics.distinct_keys,
                metrics.total_duration
            );
        }
        Ok(LoadArtifacts { table, metrics })
    }

    fn run_chunk<S, P>(
        &self,
        source: &S,
        parser: &P,
        plan: &ChunkPlan,
        chunk: ChunkSpec,
        read_lock: Option<&Mutex<()>>,
    ) -> Result<ChunkOutcome>
    where
        S: RecordSource + ?Sized,
        P: RecordParser<S::Record> + ?Sized,
    {
        let started = Instant::now();
        let (raw, status) = match read_lock {
            Some(lock) => {
                let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
                drain_chunk(source, chunk.offset, chunk.size)?
            }
            None => drain_chunk(source, chunk.offset, chunk.size)?,
        };
        let dataset = parse_chunk(parser, chunk.offset, &raw)?;
        drop(raw);
        if status == ChunkStatus::EndOfInput && chunk.index + 1 < plan.num_chunks() {
            warn!(
                "chunk {} ended after {} of {} records; the source is shorter than its count",
                chunk.index,
                dataset.len(),
                chunk.size
            );
        }

        let records = dataset.len();
        let table = aggregate(dataset, self.cfg.class_counting);
        let metrics = ChunkMetrics {
            index: chunk.index,
            offset: chunk.offset,
            records,
            status,
            distinct_keys: table.len(),
            elapsed: started.elapsed(),
        };
        debug!(
            "chunk {} [{}..{}) read {} records into {} keys in {:.2?}",
            chunk.index,
            chunk.offset,
            chunk.end(),
            records,
            metrics.distinct_keys,
            metrics.elapsed
        );
        Ok(ChunkOutcome { table, metrics })
    }
}

impl fmt::Display for LoadArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Frequency table with {} keys over {} classes",
            self.table.len(),
            self.table.classes().len()
        )?;
        writeln!(
            f,
            "Records: {} in {} chunks of {}",
            self.metrics.total_records,
            self.metrics.chunks.len(),
            self.metrics.chunk_size
        )?;
        writeln!(f, "Total duration: {:?}", self.metrics.total_duration)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassCounting;
    use crate::error::RecordError;
    use crate::sample::Sample;
    use crate::source::{MemoryCursor, MemorySource, RecordCursor};
    use csv::StringRecord;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn loader(chunk_size: usize) -> Loader {
        Loader::new(
            LoaderConfig::builder()
                .chunk_size(chunk_size)
                .build()
                .unwrap(),
        )
    }

    fn records(rows: &[(&str, &str)]) -> MemorySource<StringRecord> {
        rows.iter()
            .map(|(features, class)| StringRecord::from(vec![*features, *class]))
            .collect()
    }

    fn parser() -> DelimitedParser {
        DelimitedParser::default()
    }

    #[test]
    fn two_single_record_chunks_merge_per_sample() {
        let source = records(&[("[[1,2]]", "0"), ("[[2,3]]", "1")]);
        let cfg = LoaderConfig::builder()
            .chunk_size(1)
            .class_counting(ClassCounting::PerSample)
            .build()
            .unwrap();
        let artifacts = Loader::new(cfg)
            .load_from_source(&source, &parser())
            .unwrap();
        let rendered = serde_json::to_string(&artifacts.table).unwrap();
        assert_eq!(rendered, r#"{"0":1,"0|1":1,"0|2":1,"1":1,"1|2":1,"1|3":1}"#);
        assert_eq!(artifacts.metrics.chunks.len(), 2);
    }

    #[test]
    fn two_single_record_chunks_merge_per_feature() {
        let source = records(&[("[[1,2]]", "0"), ("[[2,3]]", "1")]);
        let table = loader(1).load_from_source(&source, &parser()).unwrap().table;
        assert_eq!(table.class_count(0), 2);
        assert_eq!(table.class_count(1), 2);
        assert_eq!(table.feature_count(0, 1), 1);
        assert_eq!(table.feature_count(0, 2), 1);
        assert_eq!(table.feature_count(1, 2), 1);
        assert_eq!(table.feature_count(1, 3), 1);
        assert_eq!(table.len(), 6);
    }

    #[test]
    fn unparsable_class_fails_whole_load_with_index() {
        let source = records(&[("[[1]]", "0"), ("[[2]]", "one"), ("[[3]]", "1")]);
        let err = loader(1)
            .load_from_source(&source, &parser())
            .expect_err("malformed record");
        assert!(matches!(
            err,
            NbError::MalformedRecord {
                index: 1,
                reason: RecordError::ClassLabel(_)
            }
        ));
    }

    #[test]
    fn empty_source_is_rejected() {
        let source = records(&[]);
        let err = loader(4)
            .load_from_source(&source, &parser())
            .expect_err("empty source");
        assert!(matches!(err, NbError::EmptySource));
    }

    #[test]
    fn result_is_independent_of_chunking_and_strategy() {
        let rows: Vec<(String, String)> = (0..37)
            .map(|i| (format!("[[{}, {}], [{}]]", i % 5, i % 7, i % 3), (i % 4).to_string()))
            .collect();
        let borrowed: Vec<(&str, &str)> =
            rows.iter().map(|(f, c)| (f.as_str(), c.as_str())).collect();
        let source = records(&borrowed);
        let reference = loader(37).load_from_source(&source, &parser()).unwrap().table;
        for chunk_size in [1, 2, 5, 36, 100] {
            for strategy in [ReadStrategy::Independent, ReadStrategy::Serialized] {
                let cfg = LoaderConfig::builder()
                    .chunk_size(chunk_size)
                    .read_strategy(strategy)
                    .threads(Some(3))
                    .build()
                    .unwrap();
                let table = Loader::new(cfg)
                    .load_from_source(&source, &parser())
                    .unwrap()
                    .table;
                assert_eq!(table, reference, "chunk_size={chunk_size} {strategy:?}");
            }
        }
    }

    struct SingleCursorSource {
        inner: MemorySource<StringRecord>,
        active: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    struct TrackedCursor {
        inner: MemoryCursor<StringRecord>,
        active: Arc<AtomicUsize>,
    }

    impl RecordCursor for TrackedCursor {
        type Record = StringRecord;

        fn next_record(&mut self) -> Result<Option<StringRecord>> {
            std::thread::yield_now();
            self.inner.next_record()
        }
    }

    impl Drop for TrackedCursor {
        fn drop(&mut self) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl RecordSource for SingleCursorSource {
        type Record = StringRecord;
        type Cursor = TrackedCursor;

        fn count(&self) -> Result<usize> {
            self.inner.count()
        }

        fn read_from(&self, offset: usize) -> Result<TrackedCursor> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            Ok(TrackedCursor {
                inner: self.inner.read_from(offset)?,
                active: Arc::clone(&self.active),
            })
        }

        fn concurrent_cursors(&self) -> bool {
            false
        }
    }

    #[test]
    fn single_cursor_sources_are_drained_one_at_a_time() {
        let source = SingleCursorSource {
            inner: records(&[("[[1]]", "0"); 64]),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        };
        let cfg = LoaderConfig::builder()
            .chunk_size(4)
            .threads(Some(4))
            .build()
            .unwrap();
        let table = Loader::new(cfg)
            .load_from_source(&source, &parser())
            .unwrap()
            .table;
        assert_eq!(table.class_count(0), 64);
        assert_eq!(source.peak.load(Ordering::SeqCst), 1);
        assert_eq!(source.active.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn concurrent_failures_surface_exactly_one_error() {
        let bad = [3usize, 9, 14];
        let rows: Vec<(String, &str)> = (0..16)
            .map(|i| (format!("[[{i}]]"), if bad.contains(&i) { "x" } else { "1" }))
            .collect();
        let borrowed: Vec<(&str, &str)> = rows.iter().map(|(f, c)| (f.as_str(), *c)).collect();
        let source = records(&borrowed);
        let cfg = LoaderConfig::builder()
            .chunk_size(2)
            .threads(Some(2))
            .build()
            .unwrap();
        for _ in 0..8 {
            let outcome = Loader::new(cfg.clone()).load_from_source(&source, &parser());
            match outcome {
                Err(NbError::MalformedRecord {
                    index,
                    reason: RecordError::ClassLabel(_),
                }) => assert!(bad.contains(&index), "unexpected index {index}"),
                other => panic!("expected one malformed record error, got {other:?}"),
            }
        }
    }

    struct CountingSource {
        inner: MemorySource<StringRecord>,
        reads: Mutex<Vec<usize>>,
    }

    impl RecordSource for CountingSource {
        type Record = StringRecord;
        type Cursor = MemoryCursor<StringRecord>;

        fn count(&self) -> Result<usize> {
            self.inner.count()
        }

        fn read_from(&self, offset: usize) -> Result<MemoryCursor<StringRecord>> {
            self.reads
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(offset);
            self.inner.read_from(offset)
        }
    }

    #[test]
    fn chunks_after_a_failure_skip_their_reads() {
        let mut rows = vec![("[[1]]", "0"); 12];
        rows[3] = ("[[1]", "0");
        let source = CountingSource {
            inner: records(&rows),
            reads: Mutex::new(Vec::new()),
        };
        let cfg = LoaderConfig::builder()
            .chunk_size(2)
            .threads(Some(1))
            .build()
            .unwrap();
        let err = Loader::new(cfg)
            .load_from_source(&source, &parser())
            .expect_err("malformed features");
        assert!(matches!(
            err,
            NbError::MalformedRecord {
                index: 3,
                reason: RecordError::FeatureEncoding(_)
            }
        ));
        let reads = source.reads.into_inner().unwrap();
        assert_eq!(reads, vec![0, 2], "no chunk past the failing one is read");
    }

    #[test]
    fn invalid_config_is_rejected_before_reading() {
        let source = CountingSource {
            inner: records(&[("[[1]]", "0")]),
            reads: Mutex::new(Vec::new()),
        };
        let mut cfg = LoaderConfig::default();
        cfg.threads = Some(0);
        let err = Loader::new(cfg)
            .load_from_source(&source, &parser())
            .expect_err("zero threads");
        assert!(matches!(err, NbError::InvalidConfig(_)));
        assert!(source.reads.into_inner().unwrap().is_empty());

        let mut cfg = LoaderConfig::default();
        cfg.source_path = std::path::PathBuf::new();
        assert!(matches!(
            Loader::new(cfg).load(),
            Err(NbError::InvalidConfig(_))
        ));
    }

    #[test]
    fn closure_parsers_plug_into_the_loader() {
        let source: MemorySource<u16> = (0..10).collect();
        let parser = |class: &u16| Ok::<_, RecordError>(Sample::new(vec![vec![7]], class % 2));
        let table = loader(3).load_from_source(&source, &parser).unwrap().table;
        assert_eq!(table.class_count(0), 5);
        assert_eq!(table.feature_count(1, 7), 5);
    }

    #[test]
    fn loads_csv_file_from_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(
            &path,
            "features,class\n\"[[1,2]]\",0\n\"[[2,3]]\",1\n\"[[1],[1]]\",0\n",
        )
        .unwrap();
        let cfg = LoaderConfig::builder()
            .source_path(&path)
            .has_headers(true)
            .chunk_size(2)
            .build()
            .unwrap();
        let table = load(&cfg).unwrap();
        assert_eq!(table.class_count(0), 4);
        assert_eq!(table.feature_count(0, 1), 3);
        assert_eq!(table.class_count(1), 2);
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let dir = tempdir().unwrap();
        let cfg = LoaderConfig::builder()
            .source_path(dir.path().join("absent.csv"))
            .build()
            .unwrap();
        assert!(matches!(
            load(&cfg),
            Err(NbError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn artifacts_display_summary() {
        let source = records(&[("[[1]]", "0"), ("[[2]]", "1"), ("[[3]]", "1")]);
        let artifacts = loader(2).load_from_source(&source, &parser()).unwrap();
        let text = artifacts.to_string();
        assert!(text.contains("over 2 classes"));
        assert!(text.contains("Records: 3 in 2 chunks of 2"));
    }
}
