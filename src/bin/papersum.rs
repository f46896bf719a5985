//! CLI binary for edgequake-papersum.
//!
//! A thin shim over the library crate: maps CLI flags to `SummarizerConfig`,
//! installs logging, probes the backend and reports batch results.

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use edgequake_papersum::config::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use edgequake_papersum::pipeline::llm::check_reachable;
use edgequake_papersum::{
    run_batch, summarize_single, BatchProgressCallback, BatchReport, ExtractorStrategy,
    PaperPipeline, ProgressCallback, SingleOutcome, SummarizerConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar for the whole batch; papers finish out of order, so every
/// completion prints its own line above the bar.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} papers  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Summarising");
        Arc::new(Self { bar })
    }
}

fn file_label(pdf: &Path) -> String {
    pdf.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| pdf.display().to_string())
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_document_start(&self, _index: usize, _total: usize, pdf: &Path) {
        self.bar.set_message(file_label(pdf));
    }

    fn on_document_complete(&self, index: usize, total: usize, pdf: &Path, output: &Path) {
        self.bar.println(format!(
            "  {} [{index:>3}/{total}] {}  {}",
            green("✓"),
            file_label(pdf),
            dim(&output.display().to_string()),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, pdf: &Path, error: &str) {
        // Keep one line per paper; the full cause is in the log.
        let msg: String = if error.chars().count() > 100 {
            format!("{}\u{2026}", error.chars().take(99).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} [{index:>3}/{total}] {}  {}",
            red("✗"),
            file_label(pdf),
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _total: usize, _success_count: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Summarise every PDF under a directory (recursive)
  papersum --source papers/

  # One paper, re-extracting the text and ignoring the processed index
  papersum --file papers/doe2024.pdf --reparse

  # Local LM Studio server, more workers
  papersum --source papers/ --base-url http://localhost:1234/v1 --workers 6

  # See what would run
  papersum --source papers/ --dry-run

OUTPUT:
  <output-dir>/<primary|survey|commentary|non_research>/<citation_key>_summary.md
  <output-dir>/processed.txt        one absolute PDF path per summarised paper
  <pdf-dir>/<stem>.md               cached extracted text (reused unless --reparse)

ENVIRONMENT VARIABLES:
  LLM_API_KEY       Bearer token (falls back to a local placeholder)
  LLM_MODEL         Model ID
  LLM_BASE_URL      OpenAI-compatible endpoint ending in /v1
  PDFIUM_LIB_PATH   Path to libpdfium (else the system library is used)
  RUST_LOG          Overrides the log filter
  A .env file in the working directory is loaded first.
"#;

/// Summarise research-paper PDFs into structured Markdown with an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "papersum",
    version,
    about = "Summarise research-paper PDFs into structured Markdown with an LLM",
    long_about = "Extract the text of research-paper PDFs, ask an OpenAI-compatible LLM for one \
schema-constrained JSON summary per paper, validate and repair it, and write categorised \
Markdown summaries.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP,
    group(ArgGroup::new("input").required(true).args(["source", "file"]))
)]
struct Cli {
    /// Directory searched recursively for PDFs.
    #[arg(long)]
    source: Option<PathBuf>,

    /// A single PDF to summarise.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Summarise even if the PDF is already in the processed index.
    #[arg(long, env = "PAPERSUM_FORCE_SUMMARY")]
    force_summary: bool,

    /// Ignore cached .md text and re-extract (implies --force-summary).
    #[arg(long, env = "PAPERSUM_REPARSE")]
    reparse: bool,

    /// Text extractor: auto, pdfium or pdf-extract.
    #[arg(long, env = "PAPERSUM_EXTRACTOR", default_value = "auto")]
    extractor: ExtractorStrategy,

    /// List what would be processed without extracting or calling the LLM.
    #[arg(long)]
    dry_run: bool,

    /// Root directory for summaries and the processed index.
    #[arg(long, env = "PAPERSUM_OUTPUT_DIR", default_value = "output_summaries")]
    output_dir: PathBuf,

    /// LLM model ID.
    #[arg(long, env = "LLM_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// OpenAI-compatible base URL (ending in /v1).
    #[arg(long, env = "LLM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Maximum characters of paper text sent to the model.
    #[arg(long, env = "PAPERSUM_MAX_CHARS", default_value_t = 200_000)]
    max_chars: usize,

    /// Directory of reference guideline files (*.md) embedded in every prompt.
    #[arg(long, env = "PAPERSUM_SKILL_DATA_DIR", default_value = "skill_data/references")]
    skill_data_dir: PathBuf,

    /// Enable DEBUG-level logs.
    #[arg(short, long, env = "PAPERSUM_VERBOSE")]
    verbose: bool,

    /// Log file (default: logs/run_<timestamp>.log).
    #[arg(long, env = "PAPERSUM_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Do not write a log file.
    #[arg(long, conflicts_with = "log_file")]
    no_log_file: bool,

    /// Disable the progress bar in batch mode.
    #[arg(long, env = "PAPERSUM_NO_PROGRESS")]
    no_progress: bool,

    /// Per-request LLM timeout in seconds.
    #[arg(long, env = "PAPERSUM_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Papers processed concurrently.
    #[arg(long, env = "PAPERSUM_WORKERS", default_value_t = 3,
          value_parser = clap::value_parser!(u32).range(1..))]
    workers: u32,

    /// Cap on generated tokens per call (omitted from the request if unset).
    #[arg(long, env = "PAPERSUM_MAX_OUTPUT_TOKENS")]
    max_output_tokens: Option<u32>,

    /// Retries on rate limits and server errors.
    #[arg(long, env = "PAPERSUM_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is the normal case.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let log_path = match init_logging(&cli) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("{} {e:#}", red("error:"));
            return ExitCode::FAILURE;
        }
    };
    if let Some(path) = &log_path {
        info!("Logging to {}", path.display());
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("{} {e:#}", red("error:"));
            ExitCode::FAILURE
        }
    }
}

/// Stderr layer plus an optional non-ANSI file layer. `RUST_LOG` wins over
/// `--verbose`. Returns the log file path in use.
fn init_logging(cli: &Cli) -> Result<Option<PathBuf>> {
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .with_filter(filter());

    let log_path = if cli.no_log_file {
        None
    } else {
        Some(cli.log_file.clone().unwrap_or_else(|| {
            PathBuf::from(format!(
                "logs/run_{}.log",
                chrono::Local::now().format("%Y%m%d_%H%M%S")
            ))
        }))
    };

    let file_layer = match &log_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {parent:?}"))?;
            }
            let file = File::create(path)
                .with_context(|| format!("Failed to create log file {path:?}"))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_thread_names(true)
                    .with_filter(filter()),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(log_path)
}

/// Map CLI args to `SummarizerConfig`.
fn build_config(cli: &Cli) -> Result<SummarizerConfig> {
    SummarizerConfig::builder()
        .base_url(&cli.base_url)
        .model(&cli.model)
        .timeout_secs(cli.timeout)
        .max_output_tokens(cli.max_output_tokens)
        .max_chars(cli.max_chars)
        .reparse(cli.reparse)
        .force_summary(cli.force_summary || cli.reparse)
        .extractor(cli.extractor)
        .dry_run(cli.dry_run)
        .output_dir(&cli.output_dir)
        .references_dir(&cli.skill_data_dir)
        .workers(cli.workers as usize)
        .max_retries(cli.max_retries)
        .build()
        .context("Invalid configuration")
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = build_config(&cli)?;
    if cli.reparse && !cli.force_summary {
        info!("--reparse implies --force-summary");
    }

    if !config.dry_run {
        check_reachable(&config.base_url, PROBE_TIMEOUT)
            .await
            .with_context(|| format!("LLM backend at {} is not reachable", config.base_url))?;
    }

    if let Some(pdf) = &cli.file {
        return run_single(pdf, &config).await;
    }

    let source = cli
        .source
        .as_deref()
        .context("either --source or --file is required")?;
    if !source.is_dir() {
        bail!("source directory not found: {}", source.display());
    }

    let progress: Option<ProgressCallback> = if cli.no_progress || config.dry_run {
        None
    } else {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    };

    let report = run_batch(source, &config, progress)
        .await
        .context("Batch run failed")?;
    Ok(report_batch(&report))
}

async fn run_single(pdf: &Path, config: &SummarizerConfig) -> Result<ExitCode> {
    if !pdf.is_file() {
        bail!("file not found: {}", pdf.display());
    }
    if config.dry_run {
        info!("[dry run] would process {}", pdf.display());
        return Ok(ExitCode::SUCCESS);
    }

    let pipeline = PaperPipeline::from_config(config).context("Failed to set up the pipeline")?;
    match summarize_single(pdf, config, &pipeline).await? {
        SingleOutcome::Skipped => {}
        SingleOutcome::Written(path) => {
            eprintln!("{} {}", green("✔"), bold(&path.display().to_string()));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn report_batch(report: &BatchReport) -> ExitCode {
    info!(
        "Done: processed={} skipped={} failed={}",
        report.processed, report.skipped, report.failed
    );
    eprintln!(
        "{} processed {}  skipped {}  failed {}",
        if report.has_failures() { red("✘") } else { green("✔") },
        bold(&report.processed.to_string()),
        report.skipped,
        report.failed,
    );

    if !report.has_failures() {
        return ExitCode::SUCCESS;
    }
    error!("Failed papers:");
    for failed in &report.failed_papers {
        error!("  {}: {}", failed.pdf_path.display(), failed.error);
    }
    ExitCode::FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("papersum").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn skill_data_dir_is_the_references_directory() {
        let cli = parse(&["--source", "papers"]);
        assert_eq!(
            build_config(&cli).unwrap().references_dir,
            PathBuf::from("skill_data/references")
        );

        let cli = parse(&["--file", "a.pdf", "--skill-data-dir", "guides/refs"]);
        assert_eq!(
            build_config(&cli).unwrap().references_dir,
            PathBuf::from("guides/refs")
        );
    }

    #[test]
    fn reparse_implies_force_summary() {
        let config = build_config(&parse(&["--source", "papers", "--reparse"])).unwrap();
        assert!(config.reparse);
        assert!(config.force_summary);
    }

    #[test]
    fn source_and_file_are_exclusive() {
        assert!(Cli::try_parse_from(["papersum", "--source", "p", "--file", "a.pdf"]).is_err());
        assert!(Cli::try_parse_from(["papersum", "--dry-run"]).is_err());
    }
}
