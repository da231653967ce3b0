//! Archive unpacking with single-root normalisation.
//!
//! Model tarballs usually wrap their payload in one directory named after the
//! archive (`PP-OCRv5_mobile_det_infer/inference.yml`). When every member
//! shares one top-level directory it is stripped, so the model files land
//! directly in the destination. Archives with several top-level entries are
//! unpacked verbatim.
//!
//! Unpacking happens in a `<dest>.partial` staging directory. A `.extracted`
//! sentinel is written last and the staging directory is renamed into place,
//! so a half-unpacked model is never mistaken for a finished one. The
//! sentinel holds the archive's fingerprint (its SHA-256 from the `.fetched`
//! sidecar when there is one), and a directory built from any other archive
//! is unpacked again.
//!
//! Members may not leave the staging directory: no absolute or `..` paths,
//! no symlinks pointing outside, and no writes through a symlinked parent.

use crate::error::ExtractError;
use crate::store::read_marker;
use flate2::read::GzDecoder;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::{debug, info, warn};

/// Sentinel file written inside a fully extracted model directory.
pub const EXTRACTED_SENTINEL: &str = ".extracted";

/// Whether [`ArchiveExtractor::ensure_extracted`] unpacked anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractStatus {
    /// The destination was already complete.
    AlreadyPresent,
    /// The archive was unpacked by this call.
    Extracted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOutcome {
    pub directory: PathBuf,
    pub status: ExtractStatus,
}

/// Unpacks tar and tar.gz archives into model directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveExtractor;

impl ArchiveExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Unpack `archive_path` into `dest_dir` unless that was already done.
    pub fn ensure_extracted(
        &self,
        archive_path: &Path,
        dest_dir: &Path,
    ) -> Result<ExtractOutcome, ExtractError> {
        let fingerprint = archive_fingerprint(archive_path);

        match fs::read_to_string(dest_dir.join(EXTRACTED_SENTINEL)) {
            Ok(recorded) if recorded.trim() == fingerprint => {
                info!("Already extracted: {}", dest_dir.display());
                return Ok(ExtractOutcome {
                    directory: dest_dir.to_path_buf(),
                    status: ExtractStatus::AlreadyPresent,
                });
            }
            Ok(_) => {
                warn!(
                    "{} was extracted from a different archive; extracting again",
                    dest_dir.display()
                );
                remove_dir(dest_dir)?;
            }
            Err(_) if dest_dir.exists() => {
                warn!(
                    "{} exists without an extraction sentinel; extracting again",
                    dest_dir.display()
                );
                remove_dir(dest_dir)?;
            }
            Err(_) => {}
        }

        info!(
            "Extracting {} → {}",
            archive_path.display(),
            dest_dir.display()
        );

        let staging = staging_dir(dest_dir);
        if staging.exists() {
            remove_dir(&staging)?;
        }
        fs::create_dir_all(&staging).map_err(|source| io_err(&staging, source))?;

        if let Err(e) = unpack(archive_path, &staging) {
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        let sentinel = staging.join(EXTRACTED_SENTINEL);
        fs::write(&sentinel, &fingerprint)
            .map_err(|source| io_err(&sentinel, source))?;
        fs::rename(&staging, dest_dir).map_err(|source| io_err(dest_dir, source))?;

        Ok(ExtractOutcome {
            directory: dest_dir.to_path_buf(),
            status: ExtractStatus::Extracted,
        })
    }
}

/// SHA-256 recorded by the archive store, or the archive path when the
/// archive did not come through the store.
fn archive_fingerprint(archive_path: &Path) -> String {
    match read_marker(archive_path) {
        Some(marker) => format!("sha256:{}", marker.sha256),
        None => format!("path:{}", archive_path.display()),
    }
}

/// The single top-level directory shared by all member names, if any.
///
/// Returns `None` when members sit under several top-level names, or when the
/// only top-level name has nothing beneath it (a lone file).
pub fn common_root<'a>(names: impl IntoIterator<Item = &'a str>) -> Option<String> {
    let mut roots = BTreeSet::new();
    let mut has_children = false;

    for name in names {
        let (top, rest) = split_top(name);
        if top.is_empty() {
            continue;
        }
        roots.insert(top.to_string());
        has_children |= rest.is_some_and(|r| !r.is_empty());
    }

    if roots.len() == 1 && has_children {
        roots.into_iter().next()
    } else {
        None
    }
}

/// Split a member name into its first segment and the remainder.
fn split_top(name: &str) -> (&str, Option<&str>) {
    let name = name.trim_start_matches("./").trim_start_matches('/');
    match name.split_once('/') {
        Some((top, rest)) => (top, Some(rest.trim_end_matches('/'))),
        None => (name, None),
    }
}

/// Member path relative to the root, or `None` for the root entry itself.
fn strip_root<'a>(name: &'a str, root: &str) -> Option<&'a str> {
    match split_top(name) {
        (top, Some(rest)) if top == root && !rest.is_empty() => Some(rest),
        _ => None,
    }
}

/// Reject anything that could escape the destination.
fn safe_relative(archive: &Path, member: &str) -> Result<PathBuf, ExtractError> {
    let path = Path::new(member);
    let safe = path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if safe {
        Ok(path.to_path_buf())
    } else {
        Err(ExtractError::UnsafePath {
            archive: archive.to_path_buf(),
            member: member.to_string(),
        })
    }
}

/// Whether a symlink stored at `member` with target `link` stays inside the
/// extraction root. Resolved lexically against the member's parent.
fn link_stays_inside(member: &Path, link: &Path) -> bool {
    let mut depth = member
        .parent()
        .map(|p| p.components().filter(|c| matches!(c, Component::Normal(_))).count())
        .unwrap_or(0);
    for component in link.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir if depth > 0 => depth -= 1,
            _ => return false,
        }
    }
    true
}

/// Refuse to write `target` if an existing ancestor resolves outside
/// `staging_root` (a canonical path), or if `target` is itself a symlink.
fn ensure_contained(
    staging_root: &Path,
    target: &Path,
    archive: &Path,
    member: &str,
) -> Result<(), ExtractError> {
    let unsafe_path = || ExtractError::UnsafePath {
        archive: archive.to_path_buf(),
        member: member.to_string(),
    };

    if fs::symlink_metadata(target).is_ok_and(|m| m.file_type().is_symlink()) {
        return Err(unsafe_path());
    }

    let mut ancestor = target.parent();
    while let Some(dir) = ancestor {
        if fs::symlink_metadata(dir).is_ok() {
            let resolved = fs::canonicalize(dir).map_err(|_| unsafe_path())?;
            return if resolved.starts_with(staging_root) {
                Ok(())
            } else {
                Err(unsafe_path())
            };
        }
        ancestor = dir.parent();
    }
    Err(unsafe_path())
}

fn unpack(archive_path: &Path, staging: &Path) -> Result<(), ExtractError> {
    let names = member_names(archive_path)?;
    if names.is_empty() {
        return Err(ExtractError::Empty {
            path: archive_path.to_path_buf(),
        });
    }

    match common_root(names.iter().map(String::as_str)) {
        Some(root) => {
            debug!("Stripping top-level directory '{}'", root);
            unpack_stripped(archive_path, staging, &root)
        }
        None => {
            debug!("Archive has several top-level entries; unpacking verbatim");
            let mut archive = open_archive(archive_path)?;
            archive
                .unpack(staging)
                .map_err(|e| malformed(archive_path, e))
        }
    }
}

fn unpack_stripped(archive_path: &Path, staging: &Path, root: &str) -> Result<(), ExtractError> {
    let staging_root = fs::canonicalize(staging).map_err(|source| io_err(staging, source))?;
    let mut archive = open_archive(archive_path)?;
    let entries = archive.entries().map_err(|e| malformed(archive_path, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| malformed(archive_path, e))?;
        let name = entry
            .path()
            .map_err(|e| malformed(archive_path, e))?
            .to_string_lossy()
            .into_owned();

        let Some(relative) = strip_root(&name, root) else {
            continue;
        };
        let relative = safe_relative(archive_path, relative)?;
        let target = staging.join(&relative);
        ensure_contained(&staging_root, &target, archive_path, &name)?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| io_err(parent, source))?;
        }

        let link = entry
            .link_name()
            .map_err(|e| malformed(archive_path, e))?
            .map(|l| l.to_string_lossy().into_owned());

        match entry.header().entry_type() {
            EntryType::Link => {
                // Hard-link targets are archive paths too and need the same strip.
                let link = link.unwrap_or_default();
                let link_rel = strip_root(&link, root).unwrap_or(&link);
                let source = staging.join(safe_relative(archive_path, link_rel)?);
                ensure_contained(&staging_root, &source, archive_path, &name)?;
                fs::hard_link(&source, &target).map_err(|e| io_err(&target, e))?;
                continue;
            }
            EntryType::Symlink => {
                let link = link.unwrap_or_default();
                if !link_stays_inside(&relative, Path::new(&link)) {
                    return Err(ExtractError::UnsafePath {
                        archive: archive_path.to_path_buf(),
                        member: format!("{name} -> {link}"),
                    });
                }
            }
            _ => {}
        }

        entry
            .unpack(&target)
            .map_err(|e| malformed(archive_path, e))?;
    }

    Ok(())
}

fn member_names(archive_path: &Path) -> Result<Vec<String>, ExtractError> {
    let mut archive = open_archive(archive_path)?;
    let entries = archive.entries().map_err(|e| malformed(archive_path, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| malformed(archive_path, e))?;
        let path = entry.path().map_err(|e| malformed(archive_path, e))?;
        names.push(path.to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Open a tar file, transparently gunzipping when it starts with the gzip magic.
fn open_archive(path: &Path) -> Result<Archive<Box<dyn Read>>, ExtractError> {
    let mut file = File::open(path).map_err(|source| io_err(path, source))?;

    let mut magic = [0u8; 2];
    let gzipped = match file.read_exact(&mut magic) {
        Ok(()) => magic == [0x1f, 0x8b],
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => false,
        Err(source) => return Err(io_err(path, source)),
    };
    file.seek(SeekFrom::Start(0))
        .map_err(|source| io_err(path, source))?;

    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    Ok(Archive::new(reader))
}

fn staging_dir(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".partial");
    dest.with_file_name(name)
}

fn remove_dir(path: &Path) -> Result<(), ExtractError> {
    fs::remove_dir_all(path).map_err(|source| io_err(path, source))
}

fn io_err(path: &Path, source: io::Error) -> ExtractError {
    ExtractError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn malformed(path: &Path, e: io::Error) -> ExtractError {
    ExtractError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
