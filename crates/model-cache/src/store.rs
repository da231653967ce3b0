//! Download-if-absent cache for remote archives.
//!
//! An archive only counts as cached when its `.fetched` sidecar exists and
//! agrees with the file on disk and with the URL being requested. The sidecar is written after the archive has
//! been fully streamed, hashed and renamed into place, so an interrupted
//! download never looks complete on the next run.

use crate::asset::AssetSpec;
use crate::error::FetchError;
use crate::transport::{DefaultTransport, ProgressFn, Transport};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MARKER_SUFFIX: &str = "fetched";
const PARTIAL_SUFFIX: &str = "part";

/// Whether [`ArchiveStore::ensure_fetched`] hit the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// A complete archive was already on disk.
    Hit,
    /// The archive was downloaded by this call.
    Downloaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub path: PathBuf,
    pub status: CacheStatus,
}

/// Completion sidecar stored next to each archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchMarker {
    pub url: String,
    pub size: u64,
    pub sha256: String,
}

/// Maps remote assets to local archive files.
#[derive(Debug, Clone)]
pub struct ArchiveStore<T = DefaultTransport> {
    transport: T,
}

impl ArchiveStore<DefaultTransport> {
    /// Store backed by HTTP(S) and `file://` transports.
    pub fn new() -> Result<Self, FetchError> {
        Ok(Self::with_transport(DefaultTransport::new()?))
    }
}

impl<T: Transport> ArchiveStore<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    /// Return the cached archive for `asset`, downloading it if needed.
    ///
    /// On failure the partial file is removed and nothing is marked complete.
    pub fn ensure_fetched(
        &self,
        asset: &AssetSpec,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<FetchOutcome, FetchError> {
        let path = &asset.local_cache_path;

        if is_complete(asset) {
            info!(role = %asset.role, "Already downloaded: {}", path.display());
            return Ok(FetchOutcome {
                path: path.clone(),
                status: CacheStatus::Hit,
            });
        }

        if path.exists() {
            warn!(
                role = %asset.role,
                "Cached archive {} has no valid completion marker; downloading again",
                path.display()
            );
        }

        info!(role = %asset.role, "Downloading {} ...", asset.remote_location);
        let marker = match self.download(asset, on_progress) {
            Ok(marker) => marker,
            Err(e) => {
                let _ = fs::remove_file(sibling(path, PARTIAL_SUFFIX));
                return Err(e);
            }
        };

        debug!(
            role = %asset.role,
            size = marker.size,
            sha256 = %marker.sha256,
            "Archive stored at {}",
            path.display()
        );

        Ok(FetchOutcome {
            path: path.clone(),
            status: CacheStatus::Downloaded,
        })
    }

    fn download(
        &self,
        asset: &AssetSpec,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<FetchMarker, FetchError> {
        let path = &asset.local_cache_path;
        let url = asset.remote_location.to_string();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;
        }
        // Drop any previous marker first so a crash below can't resurrect it.
        let marker_path = sibling(path, MARKER_SUFFIX);
        remove_if_present(&marker_path)?;

        let partial = sibling(path, PARTIAL_SUFFIX);
        let file = File::create(&partial).map_err(|source| io_err(&partial, source))?;
        let mut sink = HashingWriter::new(BufWriter::new(file));

        let size = self
            .transport
            .fetch(&asset.remote_location, &mut sink, on_progress)?;
        let (writer, sha256) = sink.finish();
        writer
            .into_inner()
            .map_err(|e| io_err(&partial, e.into_error()))?
            .sync_all()
            .map_err(|source| io_err(&partial, source))?;

        if size == 0 {
            return Err(FetchError::Empty { url });
        }
        if let Some(expected) = &asset.sha256 {
            if !expected.eq_ignore_ascii_case(&sha256) {
                return Err(FetchError::ChecksumMismatch {
                    url,
                    expected: expected.clone(),
                    actual: sha256,
                });
            }
        }

        fs::rename(&partial, path).map_err(|source| io_err(path, source))?;

        let marker = FetchMarker { url, size, sha256 };
        let json = serde_json::to_vec_pretty(&marker).map_err(|e| {
            io_err(&marker_path, io::Error::new(io::ErrorKind::InvalidData, e))
        })?;
        fs::write(&marker_path, json).map_err(|source| io_err(&marker_path, source))?;

        Ok(marker)
    }
}

/// Path of the completion sidecar for a cached archive.
pub fn marker_path(archive: &Path) -> PathBuf {
    sibling(archive, MARKER_SUFFIX)
}

/// Read the completion sidecar, if present and well-formed.
pub fn read_marker(archive: &Path) -> Option<FetchMarker> {
    let bytes = fs::read(marker_path(archive)).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn is_complete(asset: &AssetSpec) -> bool {
    let path = &asset.local_cache_path;
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    let Some(marker) = read_marker(path) else {
        return false;
    };
    if marker.size != meta.len() || marker.url != asset.remote_location.as_str() {
        return false;
    }
    match &asset.sha256 {
        Some(expected) => expected.eq_ignore_ascii_case(&marker.sha256),
        None => true,
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}

fn remove_if_present(path: &Path) -> Result<(), FetchError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(io_err(path, source)),
    }
}

fn io_err(path: &Path, source: io::Error) -> FetchError {
    FetchError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Hashes everything written through it.
struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    fn finish(self) -> (W, String) {
        (self.inner, format!("{:x}", self.hasher.finalize()))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
