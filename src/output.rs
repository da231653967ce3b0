//! Result types returned by the `pdf_to_sql*` entry points.

use crate::pipeline::ocr::PageText;
use serde::{Deserialize, Serialize};

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqlOutput {
    /// The extracted SQL statement.
    pub sql: String,
    /// The model's answer before extraction.
    pub raw_response: String,
    /// Recognised lines, per page, after score filtering.
    pub pages: Vec<PageText>,
    pub stats: RunStats,
}

/// Counters and timings for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub total_pages: usize,
    /// Pages with at least one recognised line.
    pub pages_with_text: usize,
    pub recognized_lines: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub render_duration_ms: u64,
    pub ocr_duration_ms: u64,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}

impl RunStats {
    pub(crate) fn count_pages(&mut self, pages: &[PageText]) {
        self.total_pages = pages.len();
        self.pages_with_text = pages.iter().filter(|p| !p.lines.is_empty()).count();
        self.recognized_lines = pages.iter().map(|p| p.lines.len()).sum();
    }
}
