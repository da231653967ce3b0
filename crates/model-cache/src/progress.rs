//! Progress callbacks for model acquisition.
//!
//! Every method has a no-op default, so implementors only override the
//! events they render. Roles are processed one after another, so calls never
//! overlap.

use crate::extract::ExtractStatus;
use crate::patch::PatchOutcome;
use crate::store::CacheStatus;
use reqwest::Url;
use std::path::Path;

pub trait AcquisitionProgress {
    /// A role is about to be checked or downloaded.
    fn on_fetch_start(&self, role: &str, url: &Url) {
        let _ = (role, url);
    }

    /// Bytes received so far for the role's archive.
    fn on_fetch_progress(&self, role: &str, downloaded: u64, total: Option<u64>) {
        let _ = (role, downloaded, total);
    }

    /// The archive is on disk, either cached or freshly downloaded.
    fn on_fetch_complete(&self, role: &str, archive: &Path, status: CacheStatus) {
        let _ = (role, archive, status);
    }

    /// The archive could not be fetched. No further events follow for the role.
    fn on_fetch_failed(&self, role: &str, error: &str) {
        let _ = (role, error);
    }

    /// Unpacking into `directory` is about to be checked or started.
    fn on_extract_start(&self, role: &str, archive: &Path, directory: &Path) {
        let _ = (role, archive, directory);
    }

    /// The model directory is ready to use.
    fn on_extract_complete(&self, role: &str, directory: &Path, status: ExtractStatus) {
        let _ = (role, directory, status);
    }

    /// Config patching finished (or was not needed).
    fn on_patch_complete(&self, role: &str, outcome: &PatchOutcome) {
        let _ = (role, outcome);
    }

    /// Config patching failed; the directory is still handed out.
    fn on_patch_error(&self, role: &str, error: &str) {
        let _ = (role, error);
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl AcquisitionProgress for NoProgress {}
