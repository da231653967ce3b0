//! Pipeline stages for PDF-to-SQL generation.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ ocr ──▶ llm ──▶ postprocess
//! (path)    (pdfium)   (paddle) (LLM)  (SQL cut)
//! ```
//!
//! 1. [`input`]: check the user-supplied path is a readable PDF
//! 2. [`render`]: rasterise every page; runs in `spawn_blocking`
//! 3. [`ocr`]: recognise text lines per page behind the [`ocr::OcrEngine`] trait
//! 4. [`llm`]: one completion call behind the [`llm::TextGenerator`] trait
//! 5. [`postprocess`]: deterministic rules that cut the SQL statement out
//!    of the model's answer

pub mod input;
pub mod llm;
pub mod ocr;
pub mod postprocess;
pub mod render;
