//! Error types for the pdf2sql library.
//!
//! Every variant of [`Pdf2SqlError`] is fatal for the run: there is one SQL
//! statement per document, so there is no partial result to fall back to.
//! Model acquisition failures arrive wrapped from [`model_cache::AcquireError`];
//! config-patch anomalies never get here because the acquisition pipeline only
//! logs them.

use model_cache::AcquireError;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf2sql library.
#[derive(Debug, Error)]
pub enum Pdf2SqlError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library in the working\n\
directory, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    // ── Model errors ──────────────────────────────────────────────────────
    /// Detector or recogniser model could not be made available.
    #[error("OCR model acquisition failed: {0}")]
    Acquisition(#[from] AcquireError),

    /// Acquisition finished but a role the OCR engine needs is not in the result.
    #[error("No model directory for role '{role}'")]
    ModelRoleMissing { role: String },

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The OCR program could not be started.
    #[error("OCR program '{program}' could not be run: {detail}\nInstall PaddleOCR (`pip install paddleocr`) or pass --ocr-program.")]
    OcrUnavailable { program: String, detail: String },

    /// The OCR program ran but failed on a page, or its output was unreadable.
    #[error("OCR failed on page {page}: {detail}")]
    OcrFailed { page: usize, detail: String },

    /// Every page came back without a single recognised line.
    #[error("No text was recognised on any of the {pages} page(s)")]
    NoTextRecognized { pages: usize },

    // ── Schema errors ─────────────────────────────────────────────────────
    /// The database schema document is missing or has the wrong shape.
    #[error("Invalid database schema '{path}': {reason}")]
    SchemaInvalid { path: PathBuf, reason: String },

    // ── LLM errors ────────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The LLM API returned an error.
    #[error("LLM API error: {message}")]
    LlmApiError { message: String },

    /// The model answered, but nothing resembling SQL was left after cleanup.
    #[error("The language model produced no SQL. Raw response:\n{response}")]
    NoSqlGenerated { response: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
