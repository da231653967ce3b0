//! Text detection and recognition over rendered pages.
//!
//! [`OcrEngine`] is the seam: one page image in, recognised lines out. The
//! default [`PaddleOcrEngine`] drives the PaddleOCR command line with the
//! detector and recogniser directories produced by model acquisition, and
//! reads back the `*_res.json` file PaddleOCR saves for each input image.
//!
//! Pages go through the engine strictly one after another on a blocking
//! thread.

use crate::config::{DETECTOR_ROLE, RECOGNIZER_ROLE};
use crate::error::Pdf2SqlError;
use image::DynamicImage;
use model_cache::ModelDirs;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info};

/// One line of recognised text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedLine {
    pub text: String,
    /// Recogniser confidence in `0.0..=1.0`.
    pub score: f32,
}

/// Recognised lines of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-indexed page number.
    pub page_num: usize,
    pub lines: Vec<RecognizedLine>,
}

/// Turns a page image into text lines.
pub trait OcrEngine: Send + Sync {
    /// Recognise the text on `image`. `page_num` is 1-indexed and only used
    /// for error reporting.
    fn recognize(
        &self,
        page_num: usize,
        image: &DynamicImage,
    ) -> Result<Vec<RecognizedLine>, Pdf2SqlError>;
}

/// Runs each page through the engine in order, dropping lines scored below
/// `min_score` and lines with no visible text.
pub async fn recognize_pages<E>(
    engine: Arc<E>,
    images: Vec<DynamicImage>,
    min_score: f32,
) -> Result<Vec<PageText>, Pdf2SqlError>
where
    E: OcrEngine + ?Sized + 'static,
{
    tokio::task::spawn_blocking(move || -> Result<Vec<PageText>, Pdf2SqlError> {
        let mut pages = Vec::with_capacity(images.len());
        for (idx, image) in images.iter().enumerate() {
            let page_num = idx + 1;
            let lines: Vec<RecognizedLine> = engine
                .recognize(page_num, image)?
                .into_iter()
                .filter(|l| l.score >= min_score && !l.text.trim().is_empty())
                .collect();
            debug!("Page {}: {} line(s) recognised", page_num, lines.len());
            pages.push(PageText { page_num, lines });
        }
        Ok(pages)
    })
    .await
    .map_err(|e| Pdf2SqlError::Internal(format!("OCR task panicked: {}", e)))?
}

/// All recognised lines of all pages, joined with `\n`.
pub fn joined_text(pages: &[PageText]) -> String {
    pages
        .iter()
        .flat_map(|p| p.lines.iter().map(|l| l.text.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// PaddleOCR 3.x command-line driver.
#[derive(Debug, Clone)]
pub struct PaddleOcrEngine {
    program: String,
    det_dir: PathBuf,
    rec_dir: PathBuf,
}

impl PaddleOcrEngine {
    pub fn new(
        program: impl Into<String>,
        det_dir: impl Into<PathBuf>,
        rec_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            det_dir: det_dir.into(),
            rec_dir: rec_dir.into(),
        }
    }

    /// Engine over the `det` and `rec` directories of an acquisition result.
    pub fn from_models(program: impl Into<String>, models: &ModelDirs) -> Result<Self, Pdf2SqlError> {
        let dir = |role: &str| {
            models
                .get(role)
                .map(Path::to_path_buf)
                .ok_or_else(|| Pdf2SqlError::ModelRoleMissing {
                    role: role.to_string(),
                })
        };
        Ok(Self::new(program, dir(DETECTOR_ROLE)?, dir(RECOGNIZER_ROLE)?))
    }

    /// Arguments for one `paddleocr ocr` invocation.
    pub fn args(&self, input: &Path, save_dir: &Path) -> Vec<String> {
        let mut args = vec!["ocr".to_string(), "-i".to_string(), input.display().to_string()];
        args.extend([
            "--text_detection_model_dir".to_string(),
            self.det_dir.display().to_string(),
            "--text_recognition_model_dir".to_string(),
            self.rec_dir.display().to_string(),
        ]);
        for flag in [
            "--use_doc_orientation_classify",
            "--use_doc_unwarping",
            "--use_textline_orientation",
        ] {
            args.push(flag.to_string());
            args.push("False".to_string());
        }
        args.push("--save_path".to_string());
        args.push(save_dir.display().to_string());
        args
    }
}

impl OcrEngine for PaddleOcrEngine {
    fn recognize(
        &self,
        page_num: usize,
        image: &DynamicImage,
    ) -> Result<Vec<RecognizedLine>, Pdf2SqlError> {
        let failed = |detail: String| Pdf2SqlError::OcrFailed {
            page: page_num,
            detail,
        };

        let work = TempDir::new().map_err(|e| failed(format!("temp dir: {e}")))?;
        let input = work.path().join(format!("page_{page_num:04}.png"));
        let save_dir = work.path().join("out");
        image
            .save(&input)
            .map_err(|e| failed(format!("could not write page image: {e}")))?;

        let output = Command::new(&self.program)
            .args(self.args(&input, &save_dir))
            .output()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    Pdf2SqlError::OcrUnavailable {
                        program: self.program.clone(),
                        detail: e.to_string(),
                    }
                } else {
                    failed(format!("could not start '{}': {e}", self.program))
                }
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(format!(
                "'{}' exited with {}: {}",
                self.program,
                output.status,
                tail(&stderr, 800)
            )));
        }

        let result = find_result_json(&save_dir)
            .ok_or_else(|| failed(format!("no *_res.json in {}", save_dir.display())))?;
        let json = std::fs::read_to_string(&result)
            .map_err(|e| failed(format!("{}: {e}", result.display())))?;
        let lines = parse_result_json(&json).map_err(failed)?;

        info!("OCR page {}: {} line(s)", page_num, lines.len());
        Ok(lines)
    }
}

/// The fields of PaddleOCR's saved result we care about.
#[derive(Debug, Deserialize)]
struct SavedResult {
    #[serde(default)]
    rec_texts: Vec<String>,
    #[serde(default)]
    rec_scores: Vec<f32>,
}

/// Pair `rec_texts` with `rec_scores`; a missing score counts as 1.0.
pub fn parse_result_json(json: &str) -> Result<Vec<RecognizedLine>, String> {
    let saved: SavedResult =
        serde_json::from_str(json).map_err(|e| format!("unreadable OCR result: {e}"))?;
    Ok(saved
        .rec_texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| RecognizedLine {
            text,
            score: saved.rec_scores.get(i).copied().unwrap_or(1.0),
        })
        .collect())
}

fn find_result_json(dir: &Path) -> Option<PathBuf> {
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with("_res.json"))
                .unwrap_or(false)
        })
        .collect();
    found.sort();
    found.into_iter().next()
}

fn tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        trimmed.to_string()
    } else {
        let skip = count - max_chars;
        format!("\u{2026}{}", trimmed.chars().skip(skip).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn parses_saved_result() {
        let json = r#"{
            "input_path": "page_0001.png",
            "rec_texts": ["3A", "11,13", "Южный федеральный округ"],
            "rec_scores": [0.99, 0.42, 0.97],
            "rec_polys": [[[0, 0], [1, 0], [1, 1], [0, 1]]]
        }"#;
        let lines = parse_result_json(json).unwrap();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].text, "Южный федеральный округ");
        assert!((lines[1].score - 0.42).abs() < 1e-6);
    }

    #[test]
    fn missing_scores_default_to_one() {
        let lines = parse_result_json(r#"{"rec_texts": ["a", "b"], "rec_scores": [0.5]}"#).unwrap();
        assert_eq!(lines[1].score, 1.0);
    }

    #[test]
    fn garbage_result_is_an_error() {
        assert!(parse_result_json("not json").is_err());
    }

    #[test]
    fn finds_result_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("page_0001_ocr_res_img.png"), b"").unwrap();
        std::fs::write(dir.path().join("page_0001_res.json"), b"{}").unwrap();
        let found = find_result_json(dir.path()).unwrap();
        assert!(found.ends_with("page_0001_res.json"));
        assert!(find_result_json(&dir.path().join("absent")).is_none());
    }

    #[test]
    fn args_disable_preprocessing() {
        let engine = PaddleOcrEngine::new("paddleocr", "/m/det", "/m/rec");
        let args = engine.args(Path::new("/t/p.png"), Path::new("/t/out"));
        let joined = args.join(" ");
        assert!(joined.starts_with("ocr -i /t/p.png"));
        assert!(joined.contains("--text_detection_model_dir /m/det"));
        assert!(joined.contains("--text_recognition_model_dir /m/rec"));
        assert!(joined.contains("--use_doc_unwarping False"));
        assert!(joined.ends_with("--save_path /t/out"));
    }

    #[test]
    fn from_models_requires_both_roles() {
        let err = PaddleOcrEngine::from_models("paddleocr", &ModelDirs::default()).unwrap_err();
        assert!(matches!(err, Pdf2SqlError::ModelRoleMissing { ref role } if role == "det"));
    }

    #[test]
    fn missing_program_is_unavailable() {
        let engine = PaddleOcrEngine::new("definitely-not-a-real-ocr-binary", "/d", "/r");
        let image = DynamicImage::new_rgb8(4, 4);
        let err = engine.recognize(1, &image).unwrap_err();
        assert!(matches!(err, Pdf2SqlError::OcrUnavailable { .. }), "got: {err}");
    }

    #[test]
    fn tail_keeps_the_end() {
        assert_eq!(tail("  short  ", 10), "short");
        assert_eq!(tail("abcdef", 3), "\u{2026}def");
    }

    struct Scripted {
        calls: AtomicUsize,
    }

    impl OcrEngine for Scripted {
        fn recognize(
            &self,
            page_num: usize,
            _image: &DynamicImage,
        ) -> Result<Vec<RecognizedLine>, Pdf2SqlError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![
                RecognizedLine {
                    text: format!("page {page_num}"),
                    score: 0.9,
                },
                RecognizedLine {
                    text: "noise".into(),
                    score: 0.1,
                },
                RecognizedLine {
                    text: "   ".into(),
                    score: 1.0,
                },
            ])
        }
    }

    #[tokio::test]
    async fn pages_are_numbered_and_filtered() {
        let engine = Arc::new(Scripted {
            calls: AtomicUsize::new(0),
        });
        let images = vec![DynamicImage::new_rgb8(2, 2), DynamicImage::new_rgb8(2, 2)];

        let pages = recognize_pages(Arc::clone(&engine), images, 0.5).await.unwrap();

        assert_eq!(engine.calls.load(Ordering::SeqCst), 2);
        assert_eq!(pages[1].page_num, 2);
        assert_eq!(pages[0].lines.len(), 1);
        assert_eq!(joined_text(&pages), "page 1\npage 2");
    }
}
