//! CLI binary for rollcall.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `BatchConfig` and prints results.

use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rollcall::aggregate::to_tsv;
use rollcall::batch::write_result;
use rollcall::{
    process_files, AzureLayoutExtractor, BatchConfig, BatchProgressCallback, BatchStats,
    CacheStore, DocumentOutcome, DocumentStatus, FsCacheStore, Lexicon, Origin, ProgressCallback,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for the batch plus a log line per finished document. Documents
/// finish out of order, so lines are printed as they complete.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
    }

    fn on_document_complete(&self, outcome: &DocumentOutcome, total_documents: usize) {
        let source = match outcome.origin {
            Origin::Cache => dim("cached"),
            Origin::Service => dim(&format!("{} call(s)", outcome.attempts)),
            Origin::Local => dim("local"),
        };
        let (mark, detail) = match &outcome.status {
            DocumentStatus::Tables { tables } => {
                let rows: usize = tables.iter().map(|t| t.data_rows().len()).sum();
                (green("✓"), format!("{} table(s), {} rows", tables.len(), rows))
            }
            DocumentStatus::NoTables => (yellow("∅"), "no tables".to_string()),
            DocumentStatus::Failed { error } => (red("✗"), red(&error.to_string())),
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            mark,
            outcome.index + 1,
            total_documents,
            bold(&outcome.name),
            detail,
            source,
        ));
        if let Some(ref e) = outcome.cache_error {
            self.bar.println(format!("      {}", yellow(&e.to_string())));
        }
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _stats: &BatchStats) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process rosters, print the unified table as TSV
  rollcall class-3.pdf class-4.pdf

  # Write JSON (dataset + per-document outcomes + stats)
  rollcall rosters/*.pdf -o roster.json

  # Write TSV to a file
  rollcall rosters/*.pdf -o roster.tsv

  # Add your own header synonyms
  rollcall --lexicon headers.json rosters/*.pdf

  # Inspect or reset the cache
  rollcall --cache-stats
  rollcall --clear-cache

LEXICON FILE:
  {"Identifier": ["badge"], "FirstName": ["given"], "LastName": ["surname"], "Other": ["room"]}
  Entries are added to the built-in Hebrew/English lexicon.

ENVIRONMENT VARIABLES:
  ROLLCALL_ENDPOINT   Document-analysis endpoint (https://<name>.cognitiveservices.azure.com)
  ROLLCALL_API_KEY    Document-analysis API key
  RUST_LOG            Override log filtering
"#;

/// Normalise scanned roster tables into canonical ID / name columns.
#[derive(Parser, Debug)]
#[command(
    name = "rollcall",
    version,
    about = "Normalise scanned roster tables into canonical ID / name columns",
    long_about = "Extract tables from scanned rosters with a document-analysis service, detect their \
orientation, classify columns against a Hebrew/English lexicon and merge everything into one table \
ordered ID, First Name, Last Name, then the remaining columns. Results are cached by document content, \
so unchanged files are never sent twice.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Documents to process.
    files: Vec<PathBuf>,

    /// Write the result to this file (.tsv = table, otherwise JSON).
    #[arg(short, long, env = "ROLLCALL_OUTPUT")]
    output: Option<PathBuf>,

    /// Cache directory.
    #[arg(long, env = "ROLLCALL_CACHE_DIR", default_value = rollcall::config::DEFAULT_CACHE_DIR)]
    cache_dir: PathBuf,

    /// Documents processed at once.
    #[arg(short, long, env = "ROLLCALL_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Retries per document on transient service failures.
    #[arg(long, env = "ROLLCALL_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-call service timeout in seconds.
    #[arg(long, env = "ROLLCALL_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// JSON file of extra header synonyms.
    #[arg(long, env = "ROLLCALL_LEXICON")]
    lexicon: Option<PathBuf>,

    /// Document-analysis endpoint.
    #[arg(long, env = "ROLLCALL_ENDPOINT")]
    endpoint: Option<String>,

    /// Document-analysis API key.
    #[arg(long, env = "ROLLCALL_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Print the full result as JSON instead of TSV.
    #[arg(long, env = "ROLLCALL_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "ROLLCALL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ROLLCALL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ROLLCALL_QUIET")]
    quiet: bool,

    /// Delete every cached entry, then exit unless files are given.
    #[arg(long)]
    clear_cache: bool,

    /// Print cache statistics and exit.
    #[arg(long)]
    cache_stats: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.files.is_empty();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Cache maintenance ────────────────────────────────────────────────
    if cli.cache_stats || cli.clear_cache {
        let store = FsCacheStore::open(&cli.cache_dir)
            .with_context(|| format!("Failed to open cache at {}", cli.cache_dir.display()))?;
        if cli.clear_cache {
            store.clear().context("Failed to clear cache")?;
            if !cli.quiet {
                eprintln!("{} cleared {}", green("✔"), cli.cache_dir.display());
            }
        }
        if cli.cache_stats {
            let stats = store.stats().context("Failed to read cache")?;
            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
                );
            } else {
                println!("Cache:      {}", cli.cache_dir.display());
                println!("Entries:    {}", stats.entries);
                println!("No tables:  {}", stats.sentinels);
                println!("Size:       {} bytes", stats.total_bytes);
            }
            return Ok(());
        }
        if cli.files.is_empty() {
            return Ok(());
        }
    }
    if cli.files.is_empty() {
        bail!("No input files given");
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run ──────────────────────────────────────────────────────────────
    let result = process_files(&cli.files, &config)
        .await
        .context("Batch failed")?;

    if let Some(ref output_path) = cli.output {
        write_result(&result, output_path)
            .await
            .context("Failed to write output")?;
    } else {
        let body = if cli.json {
            serde_json::to_string_pretty(&result).context("Failed to serialise output")?
        } else {
            to_tsv(&result.dataset)
        };
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(body.as_bytes())
            .context("Failed to write to stdout")?;
        if !body.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet {
        print_summary(&result.stats, cli.output.as_ref());
    }
    Ok(())
}

/// Map CLI args to `BatchConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .concurrency(cli.concurrency)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout)
        .cache_dir(&cli.cache_dir);

    if let Some(ref path) = cli.lexicon {
        let extra = Lexicon::load(path)
            .with_context(|| format!("Failed to load lexicon from {}", path.display()))?;
        let mut lexicon = Lexicon::bilingual();
        lexicon.extend(&extra);
        builder = builder.lexicon(lexicon);
    }

    if let (Some(endpoint), Some(key)) = (&cli.endpoint, &cli.api_key) {
        let extractor = AzureLayoutExtractor::new(endpoint, key)
            .context("Invalid document-analysis endpoint or key")?;
        builder = builder.extractor(Arc::new(extractor));
    }

    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(stats: &BatchStats, output: Option<&PathBuf>) {
    let mark = if stats.errors == 0 {
        green("✔")
    } else {
        yellow("⚠")
    };
    let target = output
        .map(|p| format!("  →  {}", bold(&p.display().to_string())))
        .unwrap_or_default();
    eprintln!(
        "{}  {} documents  {} rows  {}ms{}",
        mark, stats.documents, stats.rows, stats.duration_ms, target
    );
    eprintln!(
        "   {} cache hits  /  {} extracted  /  {} without tables  /  {} errors",
        stats.cache_hits, stats.fresh_extractions, stats.no_tables, stats.errors
    );
    eprintln!(
        "   {}",
        dim(&format!(
            "cache hit ratio {:.0}%  ·  identifier fill {:.0}%",
            stats.cache_hit_ratio * 100.0,
            stats.identifier_fill_ratio * 100.0
        ))
    );
    if stats.cache_write_errors > 0 {
        eprintln!(
            "   {}",
            yellow(&format!("{} results could not be cached", stats.cache_write_errors))
        );
    }
}
