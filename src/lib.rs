//! # pdf2sql
//!
//! Turn a scanned price sheet (PDF) into an SQL `INSERT` statement.
//!
//! Pages are rasterised with pdfium, read by PaddleOCR using locally cached
//! PP-OCRv5 models, and the recognised text is handed to a language model
//! together with a database schema and few-shot examples.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Models   download / unpack / relabel OCR models (model-cache crate)
//!  ├─ 2. Render   rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. OCR      PaddleOCR detection + recognition, page by page
//!  ├─ 4. Prompt   schema + few-shot examples + recognised text
//!  ├─ 5. LLM      one completion via edgequake-llm
//!  └─ 6. Extract  cut the SQL statement out of the answer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf2sql::{pdf_to_sql, Pdf2SqlConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / ANTHROPIC_API_KEY / GEMINI_API_KEY
//!     let config = Pdf2SqlConfig::builder().schema_path("config.yml").build()?;
//!     let output = pdf_to_sql("data/test2.pdf", &config).await?;
//!     println!("{}", output.sql);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdf2sql` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod generate;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{default_models, Pdf2SqlConfig, Pdf2SqlConfigBuilder, DETECTOR_ROLE, RECOGNIZER_ROLE};
pub use convert::{
    pdf_to_sql, pdf_to_sql_sync, pdf_to_sql_with_progress, prepare_models, sql_from_images,
    AcquisitionProgressCallback,
};
pub use error::Pdf2SqlError;
pub use generate::{GeneratedSql, SqlGenerator};
pub use output::{RunStats, SqlOutput};
pub use pipeline::llm::{Generation, LlmGenerator, TextGenerator};
pub use pipeline::ocr::{OcrEngine, PageText, PaddleOcrEngine, RecognizedLine};
pub use schema::DatabaseSchema;

pub use model_cache;
