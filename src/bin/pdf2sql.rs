//! CLI binary for pdf2sql.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `Pdf2SqlConfig`, renders model downloads as progress bars and prints the
//! generated SQL.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf2sql::model_cache::{
    AcquisitionProgress, CacheStatus, ExtractStatus, NoProgress, PatchOutcome, Url,
};
use pdf2sql::{pdf_to_sql_with_progress, AcquisitionProgressCallback, Pdf2SqlConfig, SqlOutput};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

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
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One byte-counting bar per model role, plus a log line for each
/// acquisition step.
struct CliAcquisitionProgress {
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl CliAcquisitionProgress {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            bars: Mutex::new(HashMap::new()),
        })
    }

    fn bar_for(&self, role: &str) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap();
        bars.entry(role.to_string())
            .or_insert_with(|| {
                let bar = ProgressBar::new(0);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{spinner:.cyan} {prefix:.bold}  \
                         [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("█▉▊▋▌▍▎▏  ")
                    .tick_strings(TICKS),
                );
                bar.set_prefix(format!("model {role}"));
                bar.enable_steady_tick(Duration::from_millis(80));
                bar
            })
            .clone()
    }

    fn finish(&self, role: &str) -> Option<ProgressBar> {
        self.bars.lock().unwrap().remove(role)
    }
}

impl Drop for CliAcquisitionProgress {
    fn drop(&mut self) {
        if let Ok(mut bars) = self.bars.lock() {
            for (_, bar) in bars.drain() {
                bar.finish_and_clear();
            }
        }
    }
}

impl AcquisitionProgress for CliAcquisitionProgress {
    fn on_fetch_start(&self, role: &str, url: &Url) {
        self.bar_for(role).set_message(url.to_string());
    }

    fn on_fetch_progress(&self, role: &str, downloaded: u64, total: Option<u64>) {
        let bar = self.bar_for(role);
        if let Some(t) = total {
            if bar.length().unwrap_or(0) != t {
                bar.set_length(t);
            }
        }
        bar.set_position(downloaded);
    }

    fn on_fetch_complete(&self, role: &str, archive: &Path, status: CacheStatus) {
        if let Some(bar) = self.finish(role) {
            bar.finish_and_clear();
        }
        let what = match status {
            CacheStatus::Hit => "cached",
            CacheStatus::Downloaded => "downloaded",
        };
        eprintln!(
            "  {} {:<4} {}  {}",
            green("✓"),
            role,
            what,
            dim(&archive.display().to_string())
        );
    }

    fn on_fetch_failed(&self, role: &str, error: &str) {
        if let Some(bar) = self.finish(role) {
            bar.finish_and_clear();
        }
        eprintln!("  {} {:<4} download failed  {}", red("✗"), role, red(error));
    }

    fn on_extract_start(&self, role: &str, archive: &Path, _directory: &Path) {
        eprintln!(
            "  {} {:<4} extracting  {}",
            cyan("◆"),
            role,
            dim(&archive.display().to_string())
        );
    }

    fn on_extract_complete(&self, role: &str, directory: &Path, status: ExtractStatus) {
        let what = match status {
            ExtractStatus::AlreadyPresent => "ready",
            ExtractStatus::Extracted => "extracted",
        };
        eprintln!(
            "  {} {:<4} {}  {}",
            green("✓"),
            role,
            what,
            dim(&directory.display().to_string())
        );
    }

    fn on_patch_complete(&self, role: &str, outcome: &PatchOutcome) {
        let mark = match outcome {
            PatchOutcome::Skipped(_) => cyan("⚠"),
            _ => green("✓"),
        };
        eprintln!("  {} {:<4} config {}", mark, role, outcome);
    }

    fn on_patch_error(&self, role: &str, error: &str) {
        eprintln!("  {} {:<4} config {}", red("✗"), role, red(error));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Default run: data/test2.pdf against config.yml
  pdf2sql

  # Another document and schema
  pdf2sql scans/prices.pdf --schema db/schema.yml

  # Use a specific model
  pdf2sql --provider openai --model gpt-4.1-mini prices.pdf

  # JSON output with recognised lines and timings
  pdf2sql --json prices.pdf > run.json

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to an existing libpdfium

SETUP:
  1. Install PaddleOCR:  pip install paddleocr
  2. Set API key:        export OPENAI_API_KEY=sk-...
  3. Run:                pdf2sql

  The OCR models (~100 MB) are downloaded on first run into ./cache and
  reused afterwards.
"#;

/// Generate SQL INSERT statements from scanned PDF price sheets.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2sql",
    version,
    about = "Generate SQL INSERT statements from scanned PDF price sheets",
    long_about = "Rasterise a PDF, recognise its text with PaddleOCR (PP-OCRv5 models, \
downloaded and cached on first use) and ask a language model for an SQL INSERT statement \
matching a YAML database schema.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to read.
    #[arg(env = "PDF2SQL_INPUT", default_value = "data/test2.pdf")]
    input: PathBuf,

    /// YAML schema: table → column → type.
    #[arg(long, env = "PDF2SQL_SCHEMA", default_value = "config.yml")]
    schema: PathBuf,

    /// Directory for downloaded archives and extracted models.
    #[arg(long, env = "PDF2SQL_CACHE_DIR", default_value = "cache")]
    cache_dir: PathBuf,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini).
    #[arg(long, env = "PDF2SQL_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "PDF2SQL_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set."
    )]
    provider: Option<String>,

    /// PaddleOCR executable.
    #[arg(long, env = "PDF2SQL_OCR_PROGRAM", default_value = "paddleocr")]
    ocr_program: String,

    /// Max LLM output tokens.
    #[arg(long, env = "PDF2SQL_MAX_TOKENS", default_value_t = 200)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2SQL_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Output structured JSON (SqlOutput) instead of the bare statement.
    #[arg(long, env = "PDF2SQL_JSON")]
    json: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2SQL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2SQL_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    let progress: AcquisitionProgressCallback = if cli.quiet {
        Arc::new(NoProgress)
    } else {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Preparing OCR models in {}", cli.cache_dir.display()))
        );
        CliAcquisitionProgress::new()
    };

    let output = pdf_to_sql_with_progress(&cli.input, &config, progress)
        .await
        .with_context(|| format!("SQL generation failed for {}", cli.input.display()))?;

    if !cli.quiet {
        print_summary(&output);
    }

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.sql.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.sql.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    Ok(())
}

fn print_summary(output: &SqlOutput) {
    let stats = &output.stats;
    eprintln!(
        "{} {} page(s), {} with text, {} line(s) recognised",
        green("✔"),
        bold(&stats.total_pages.to_string()),
        stats.pages_with_text,
        stats.recognized_lines,
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out  —  {}ms total",
        dim(&stats.input_tokens.to_string()),
        dim(&stats.output_tokens.to_string()),
        stats.total_duration_ms,
    );
}

/// Map CLI args to `Pdf2SqlConfig`.
fn build_config(cli: &Cli) -> Result<Pdf2SqlConfig> {
    let mut builder = Pdf2SqlConfig::builder()
        .schema_path(&cli.schema)
        .cache_dir(&cli.cache_dir)
        .ocr_program(&cli.ocr_program)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_with_no_arguments() {
        let cli = Cli::try_parse_from(["pdf2sql"]).unwrap();
        assert_eq!(cli.input, PathBuf::from("data/test2.pdf"));
        assert_eq!(cli.schema, PathBuf::from("config.yml"));
        assert_eq!(cli.max_tokens, 200);
        assert!(!cli.json);
    }

    #[test]
    fn flags_reach_the_config() {
        let cli = Cli::try_parse_from([
            "pdf2sql",
            "in.pdf",
            "--schema",
            "db.yml",
            "--provider",
            "openai",
            "--model",
            "gpt-4.1-mini",
            "--max-tokens",
            "512",
        ])
        .unwrap();
        let config = build_config(&cli).unwrap();
        assert_eq!(config.schema_path, PathBuf::from("db.yml"));
        assert_eq!(config.provider_name.as_deref(), Some("openai"));
        assert_eq!(config.model.as_deref(), Some("gpt-4.1-mini"));
        assert_eq!(config.max_tokens, 512);
    }

    #[test]
    fn failed_fetch_stops_its_bar() {
        let progress = CliAcquisitionProgress::new();
        let url = Url::parse("https://example.com/det.tar").unwrap();
        progress.on_fetch_start("det", &url);
        progress.on_fetch_start("rec", &url);
        progress.on_fetch_progress("det", 10, Some(100));

        progress.on_fetch_failed("det", "connection reset");

        let bars = progress.bars.lock().unwrap();
        assert!(!bars.contains_key("det"));
        assert!(bars.contains_key("rec"));
    }
}
