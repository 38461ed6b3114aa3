use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use env_logger::Env;
use fastnb::{
    ChunkPlan, ClassCounting, CsvOptions, CsvSource, LoadArtifacts, Loader, LoaderConfig,
    ReadStrategy, RecordSource,
};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use serde::Serialize;
use serde_json::json;

#[derive(Parser, Debug)]
#[command(author, version, about = "Naive Bayes frequency loader", long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Decrease verbosity (-q, -qq)
    #[arg(short = 'q', long, global = true, action = ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a dataset and emit its class/feature frequency table
    Count(CountArgs),
    /// Show how a dataset would be split into chunks
    Plan(PlanArgs),
}

#[derive(Args, Debug)]
struct SourceArgs {
    /// Delimited record file (overrides `source_path` from --config)
    input: Option<PathBuf>,

    /// JSON loader configuration; flags override its values
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Records per chunk
    #[arg(long, value_name = "RECORDS")]
    chunk_size: Option<usize>,

    /// Field delimiter (single ASCII character)
    #[arg(long, value_name = "CHAR")]
    delimiter: Option<char>,

    /// Skip the first row as a header
    #[arg(long, conflicts_with = "no_headers")]
    has_headers: bool,

    /// Treat the first row as data, overriding `has_headers` from --config
    #[arg(long)]
    no_headers: bool,

    /// Index of the JSON feature-group field
    #[arg(long, value_name = "INDEX")]
    features_field: Option<usize>,

    /// Index of the class label field
    #[arg(long, value_name = "INDEX")]
    class_field: Option<usize>,
}

#[derive(Args, Debug)]
struct CountArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Write the table to PATH instead of stdout
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Emit pretty JSON
    #[arg(long)]
    pretty: bool,

    /// Write load metrics as JSON to PATH
    #[arg(long, value_name = "PATH")]
    metrics: Option<PathBuf>,

    /// Size of the dedicated worker pool
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// Serialize seek-and-read across workers
    #[arg(long)]
    serialized_reads: bool,

    /// Count each sample once in its bare class key
    #[arg(long)]
    per_sample: bool,

    /// Disable progress logging and spinner
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct PlanArgs {
    #[command(flatten)]
    source: SourceArgs,

    /// Emit JSON instead of a human-readable listing
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Count(args) => run_count(args),
        Commands::Plan(args) => run_plan(args),
    }
}

fn init_logging(verbose: u8, quiet: u8) {
    use log::LevelFilter;

    let level = if quiet > 0 {
        match quiet {
            0 => LevelFilter::Info,
            1 => LevelFilter::Warn,
            _ => LevelFilter::Error,
        }
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    builder.filter_level(level);
    let _ = builder.try_init();
}

fn loader_config(args: &SourceArgs) -> Result<LoaderConfig> {
    let mut cfg = match &args.config {
        Some(path) => LoaderConfig::from_json_file(path)?,
        None => LoaderConfig::default(),
    };
    if let Some(input) = &args.input {
        cfg.source_path = input.clone();
    } else if args.config.is_none() {
        return Err(anyhow!("an input file or --config is required"));
    }
    if let Some(chunk_size) = args.chunk_size {
        cfg.chunk_size = chunk_size;
    }
    if let Some(delimiter) = args.delimiter {
        cfg.delimiter = u8::try_from(delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| anyhow!("delimiter `{delimiter}` must be a single ASCII character"))?;
    }
    if args.has_headers {
        cfg.has_headers = true;
    } else if args.no_headers {
        cfg.has_headers = false;
    }
    if let Some(field) = args.features_field {
        cfg.features_field = field;
    }
    if let Some(field) = args.class_field {
        cfg.class_field = field;
    }
    Ok(cfg)
}

fn run_count(args: CountArgs) -> Result<()> {
    let mut cfg = loader_config(&args.source)?;
    if args.threads.is_some() {
        cfg.threads = args.threads;
    }
    if args.serialized_reads {
        cfg.read_strategy = ReadStrategy::Serialized;
    }
    if args.per_sample {
        cfg.class_counting = ClassCounting::PerSample;
    }
    cfg.show_progress = !args.no_progress;
    cfg.validate()?;

    let spinner = if args.no_progress {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner} counting chunks... {elapsed}")
            .context("invalid spinner template")?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        pb.set_style(style);
        pb.enable_steady_tick(Duration::from_millis(80));
        Some(pb)
    };

    let start = Instant::now();
    let outcome = Loader::new(cfg.clone()).load();
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let artifacts = outcome
        .with_context(|| format!("failed to load {}", cfg.source_path.display()))?;
    let elapsed = start.elapsed();

    let rendered = render_json(&artifacts.table, args.pretty)?;
    match &args.output {
        Some(path) => {
            write_file(path, rendered.as_bytes())?;
            print_summary(&artifacts, path, elapsed);
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.write_all(b"\n")?;
        }
    }
    if let Some(path) = &args.metrics {
        let metrics = render_json(&artifacts.metrics, true)?;
        write_file(path, metrics.as_bytes())?;
        info!("wrote load metrics to {}", path.display());
    }

    info!(
        "load complete: records={} chunks={} keys={} duration={elapsed:.2?}",
        artifacts.metrics.total_records,
        artifacts.metrics.chunks.len(),
        artifacts.table.len()
    );
    Ok(())
}

fn run_plan(args: PlanArgs) -> Result<()> {
    let cfg = loader_config(&args.source)?;
    cfg.validate()?;
    let source = CsvSource::open(&cfg.source_path, CsvOptions::from(&cfg))
        .with_context(|| format!("failed to open {}", cfg.source_path.display()))?;
    let total = source
        .count()
        .with_context(|| format!("failed to count records in {}", cfg.source_path.display()))?;
    let plan = ChunkPlan::new(total, cfg.chunk_size)?;
    let chunks: Vec<_> = plan.chunks().collect();

    if args.json {
        let summary = json!({
            "path": cfg.source_path.display().to_string(),
            "total_records": plan.total_records(),
            "chunk_size": plan.chunk_size(),
            "num_chunks": plan.num_chunks(),
            "chunks": chunks,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Source     : {}", cfg.source_path.display());
        println!("Records    : {}", plan.total_records());
        println!("Chunk size : {}", plan.chunk_size());
        println!("Chunks     : {}", plan.num_chunks());
        for chunk in &chunks {
            println!(
                "  #{:<6} [{}..{}) {} records",
                chunk.index,
                chunk.offset,
                chunk.end(),
                chunk.size
            );
        }
    }
    Ok(())
}

fn render_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(text)
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let mut file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    file.write_all(contents)
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

fn print_summary(artifacts: &LoadArtifacts, path: &Path, elapsed: Duration) {
    let metrics = &artifacts.metrics;
    println!(
        "✅ wrote {} keys over {} classes to {}",
        artifacts.table.len(),
        artifacts.table.classes().len(),
        path.display()
    );
    println!(
        "   records {} | chunks {} of {} | duration {:.2?}",
        metrics.records_read(),
        metrics.chunks.len(),
        metrics.chunk_size,
        elapsed
    );
}
