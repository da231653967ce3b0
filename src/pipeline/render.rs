//! PDF rasterisation: render every page to a `DynamicImage` via pdfium.
//!
//! pdfium keeps thread-local state and must not be driven from an async
//! task, so all rendering happens inside `tokio::task::spawn_blocking`.
//!
//! ## Binding
//!
//! The library is looked up in `PDFIUM_LIB_PATH` (a file or a directory),
//! then the working directory, then the system library path.

use crate::error::Pdf2SqlError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming a pdfium library file or its directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Rasterise every page of a PDF, in page order.
///
/// The longest edge of each image is capped at `max_pixels`.
pub async fn render_pages(
    pdf_path: &Path,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, Pdf2SqlError> {
    let path = pdf_path.to_path_buf();

    tokio::task::spawn_blocking(move || render_pages_blocking(&path, max_pixels))
        .await
        .map_err(|e| Pdf2SqlError::Internal(format!("Render task panicked: {}", e)))?
}

/// Bind to pdfium, trying `PDFIUM_LIB_PATH`, `./` and the system library in turn.
pub fn bind_pdfium() -> Result<Pdfium, Pdf2SqlError> {
    let mut attempts = Vec::new();

    if let Ok(configured) = std::env::var(PDFIUM_LIB_PATH_ENV) {
        if !configured.is_empty() {
            let library = library_file(Path::new(&configured));
            match Pdfium::bind_to_library(&library) {
                Ok(bindings) => return Ok(Pdfium::new(bindings)),
                Err(e) => attempts.push(format!("{}: {:?}", library.display(), e)),
            }
        }
    }

    let local = Pdfium::pdfium_platform_library_name_at_path("./");
    match Pdfium::bind_to_library(&local) {
        Ok(bindings) => return Ok(Pdfium::new(bindings)),
        Err(e) => attempts.push(format!("{}: {:?}", local.display(), e)),
    }

    match Pdfium::bind_to_system_library() {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(e) => {
            attempts.push(format!("system library: {:?}", e));
            Err(Pdf2SqlError::PdfiumBindingFailed(attempts.join("; ")))
        }
    }
}

/// A directory is expanded to the platform library name inside it.
fn library_file(configured: &Path) -> PathBuf {
    if configured.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(configured)
    } else {
        configured.to_path_buf()
    }
}

fn render_pages_blocking(
    pdf_path: &Path,
    max_pixels: u32,
) -> Result<Vec<DynamicImage>, Pdf2SqlError> {
    let pdfium = bind_pdfium()?;

    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| Pdf2SqlError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut images = Vec::with_capacity(total_pages);

    for (idx, page) in pages.iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            Pdf2SqlError::RasterisationFailed {
                page: idx + 1,
                detail: format!("{:?}", e),
            }
        })?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(image);
    }

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_expands_to_platform_library() {
        let dir = tempfile::TempDir::new().unwrap();
        let lib = library_file(dir.path());
        assert_eq!(lib.parent(), Some(dir.path()));
        assert!(lib
            .file_name()
            .map(|n| n.to_string_lossy().contains("pdfium"))
            .unwrap_or(false));
    }

    #[test]
    fn file_path_is_used_verbatim() {
        let path = Path::new("/opt/pdfium/lib/libpdfium.so");
        assert_eq!(library_file(path), path);
    }
}
