//! Input validation: make sure the PDF path is a readable PDF before any
//! model download or rendering starts.
//!
//! pdfium gives an opaque error for a non-PDF file, and by the time rendering
//! runs the models may already have been fetched. Checking the `%PDF` magic
//! bytes up front turns a typo into an immediate, readable error.

use crate::error::Pdf2SqlError;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate a local PDF path: it must exist, be readable and start with `%PDF`.
pub fn resolve_local(path: impl AsRef<Path>) -> Result<PathBuf, Pdf2SqlError> {
    let path = path.as_ref().to_path_buf();

    if !path.is_file() {
        return Err(Pdf2SqlError::FileNotFound { path });
    }

    let mut file = match std::fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(Pdf2SqlError::PermissionDenied { path });
        }
        Err(_) => return Err(Pdf2SqlError::FileNotFound { path }),
    };

    let mut magic = [0u8; 4];
    if file.read_exact(&mut magic).is_err() || &magic != b"%PDF" {
        return Err(Pdf2SqlError::NotAPdf { path, magic });
    }

    debug!("Resolved local PDF: {}", path.display());
    Ok(path)
}
