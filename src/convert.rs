//! End-to-end entry points: PDF in, SQL out.
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input    check the file is a readable PDF
//!  ├─ 2. Setup    load the schema, resolve the LLM provider
//!  ├─ 3. Models   fetch / extract / patch OCR models (blocking, spawn_blocking)
//!  ├─ 4. Render   rasterise every page via pdfium (spawn_blocking)
//!  ├─ 5. OCR      PaddleOCR over each page, one at a time
//!  ├─ 6. Prompt   schema + few-shot examples + recognised text
//!  └─ 7. SQL      one LLM call, statement cut out of the answer
//! ```
//!
//! Steps 1 and 2 run before any download so a bad path, schema or API key
//! fails in milliseconds.

use crate::config::Pdf2SqlConfig;
use crate::error::Pdf2SqlError;
use crate::generate::SqlGenerator;
use crate::output::{RunStats, SqlOutput};
use crate::pipeline::llm::{LlmGenerator, TextGenerator};
use crate::pipeline::ocr::{recognize_pages, OcrEngine, PaddleOcrEngine};
use crate::pipeline::{input, render};
use image::DynamicImage;
use model_cache::{
    AcquireError, AcquisitionProgress, ConfigPatcher, ModelAcquisitionPipeline, ModelDirs, NoProgress,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Shared progress sink for model acquisition.
pub type AcquisitionProgressCallback = Arc<dyn AcquisitionProgress + Send + Sync>;

/// Generate SQL from a PDF.
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Any failure is fatal: input, schema, provider, model acquisition,
/// rendering, OCR, an empty OCR result, the LLM call, or an answer with no SQL.
pub async fn pdf_to_sql(
    pdf_path: impl AsRef<Path>,
    config: &Pdf2SqlConfig,
) -> Result<SqlOutput, Pdf2SqlError> {
    pdf_to_sql_with_progress(pdf_path, config, Arc::new(NoProgress)).await
}

/// [`pdf_to_sql`] reporting model download and preparation to `progress`.
pub async fn pdf_to_sql_with_progress(
    pdf_path: impl AsRef<Path>,
    config: &Pdf2SqlConfig,
    progress: AcquisitionProgressCallback,
) -> Result<SqlOutput, Pdf2SqlError> {
    let total_start = Instant::now();

    // ── Step 1: Validate input ───────────────────────────────────────────
    let pdf_path = input::resolve_local(pdf_path)?;
    info!("Starting SQL generation: {}", pdf_path.display());

    // ── Step 2: Schema + provider ────────────────────────────────────────
    let generator = SqlGenerator::from_config(config, LlmGenerator::from_config(config)?)?;

    // ── Step 3: OCR models ───────────────────────────────────────────────
    let models = prepare_models(config, progress).await?;
    let engine = Arc::new(PaddleOcrEngine::from_models(&config.ocr_program, &models)?);

    // ── Step 4: Rasterise pages ──────────────────────────────────────────
    let render_start = Instant::now();
    let images = render::render_pages(&pdf_path, config.max_rendered_pixels).await?;
    let render_duration_ms = render_start.elapsed().as_millis() as u64;
    info!("Rendered {} pages in {}ms", images.len(), render_duration_ms);

    // ── Steps 5–7: OCR, prompt, SQL ──────────────────────────────────────
    let mut output = sql_from_images(images, engine, &generator, config.min_line_score).await?;
    output.stats.render_duration_ms = render_duration_ms;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

    info!(
        "SQL generated: {} page(s), {} line(s), {}ms total",
        output.stats.total_pages, output.stats.recognized_lines, output.stats.total_duration_ms
    );
    Ok(output)
}

/// Synchronous wrapper around [`pdf_to_sql`].
///
/// Creates a temporary tokio runtime internally.
pub fn pdf_to_sql_sync(
    pdf_path: impl AsRef<Path>,
    config: &Pdf2SqlConfig,
) -> Result<SqlOutput, Pdf2SqlError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Pdf2SqlError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(pdf_to_sql(pdf_path, config))
}

/// Make the configured OCR models available under `config.cache_dir`.
///
/// Acquisition is blocking I/O and runs on the blocking thread pool.
pub async fn prepare_models(
    config: &Pdf2SqlConfig,
    progress: AcquisitionProgressCallback,
) -> Result<ModelDirs, Pdf2SqlError> {
    let cache_dir = config.cache_dir.clone();
    let specs = config.models.clone();
    let patcher = ConfigPatcher::new(config.model_config_file.clone());

    let dirs = tokio::task::spawn_blocking(move || -> Result<ModelDirs, AcquireError> {
        let pipeline = ModelAcquisitionPipeline::new(cache_dir)?.with_patcher(patcher);
        pipeline.acquire_with_progress(&specs, progress.as_ref())
    })
    .await
    .map_err(|e| Pdf2SqlError::Internal(format!("Model acquisition task panicked: {}", e)))??;

    for model in dirs.iter() {
        info!(role = %model.role, "OCR model ready at {}", model.directory.display());
    }
    Ok(dirs)
}

/// OCR already-rendered pages and generate SQL from their text.
///
/// Everything after rasterisation, with the OCR engine and text generator
/// supplied by the caller.
pub async fn sql_from_images<E, G>(
    images: Vec<DynamicImage>,
    engine: Arc<E>,
    generator: &SqlGenerator<G>,
    min_line_score: f32,
) -> Result<SqlOutput, Pdf2SqlError>
where
    E: OcrEngine + ?Sized + 'static,
    G: TextGenerator,
{
    let mut stats = RunStats::default();

    let ocr_start = Instant::now();
    let pages = recognize_pages(engine, images, min_line_score).await?;
    stats.ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;
    stats.count_pages(&pages);
    info!(
        "OCR complete: {} page(s), {} line(s)",
        stats.total_pages, stats.recognized_lines
    );

    let llm_start = Instant::now();
    let generated = generator.generate_sql(&pages).await?;
    stats.llm_duration_ms = llm_start.elapsed().as_millis() as u64;
    stats.input_tokens = generated.input_tokens;
    stats.output_tokens = generated.output_tokens;
    stats.total_duration_ms = stats.ocr_duration_ms + stats.llm_duration_ms;

    Ok(SqlOutput {
        sql: generated.sql,
        raw_response: generated.raw_response,
        pages,
        stats,
    })
}
