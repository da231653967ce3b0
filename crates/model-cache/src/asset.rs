//! Asset descriptions and the on-disk cache layout.

use crate::error::AcquireError;
use reqwest::Url;
use std::path::{Path, PathBuf};

/// Directory (under the cache root) holding downloaded archives.
pub const TARS_DIR: &str = "tars";

/// Directory (under the cache root) holding extracted model directories.
pub const MODELS_DIR: &str = "official_models";

/// Field rewritten by default: `Global.model_name`.
pub const DEFAULT_FIELD_PATH: [&str; 2] = ["Global", "model_name"];

/// A rewrite of one config field from a known value to an accepted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchRule {
    /// Keys from the document root down to the field.
    pub field_path: Vec<String>,
    /// Value the field is expected to hold before patching.
    pub from: String,
    /// Value the field holds after patching.
    pub to: String,
}

impl PatchRule {
    /// Rename rule for `Global.model_name`.
    pub fn rename_model(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            field_path: DEFAULT_FIELD_PATH.iter().map(|s| s.to_string()).collect(),
            from: from.into(),
            to: to.into(),
        }
    }

    /// Dotted form of the field path, for log lines.
    pub fn field_label(&self) -> String {
        self.field_path.join(".")
    }
}

/// One model the pipeline should make available.
#[derive(Debug, Clone)]
pub struct ModelSpec {
    /// Logical role, e.g. `"det"` or `"rec"`. Unique per request.
    pub role: String,
    /// Where the archive lives.
    pub url: Url,
    /// Expected lowercase hex SHA-256 of the archive, if known.
    pub sha256: Option<String>,
    /// Config rewrite to apply after extraction.
    pub patch: Option<PatchRule>,
}

impl ModelSpec {
    pub fn new(role: impl Into<String>, url: Url) -> Self {
        Self {
            role: role.into(),
            url,
            sha256: None,
            patch: None,
        }
    }

    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into().to_ascii_lowercase());
        self
    }

    pub fn with_patch(mut self, rule: PatchRule) -> Self {
        self.patch = Some(rule);
        self
    }
}

/// A resolved asset: where it comes from and where its archive is cached.
///
/// Built by [`CacheLayout::asset`]; both paths depend only on the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetSpec {
    pub role: String,
    pub remote_location: Url,
    pub local_cache_path: PathBuf,
    pub sha256: Option<String>,
}

/// Filesystem layout rooted at a cache directory.
///
/// ```text
/// <root>/tars/<archive-filename>
/// <root>/official_models/<archive-stem>/
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tars_dir(&self) -> PathBuf {
        self.root.join(TARS_DIR)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join(MODELS_DIR)
    }

    /// Resolve a [`ModelSpec`] to its cached archive path.
    pub fn asset(&self, spec: &ModelSpec) -> Result<AssetSpec, AcquireError> {
        let filename = archive_filename(&spec.url).ok_or_else(|| AcquireError::UnnamedAsset {
            role: spec.role.clone(),
            url: spec.url.to_string(),
        })?;

        Ok(AssetSpec {
            role: spec.role.clone(),
            remote_location: spec.url.clone(),
            local_cache_path: self.tars_dir().join(filename),
            sha256: spec.sha256.clone(),
        })
    }

    /// Extraction directory for a cached archive.
    pub fn model_dir(&self, archive_path: &Path) -> PathBuf {
        let name = archive_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.models_dir().join(archive_stem(&name))
    }
}

/// Last non-empty path segment of the URL.
pub fn archive_filename(url: &Url) -> Option<String> {
    url.path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()
        .map(str::to_string)
}

/// Archive name without its `.tar`, `.tar.gz` or `.tgz` suffix.
pub fn archive_stem(name: &str) -> &str {
    for suffix in [".tar.gz", ".tgz", ".tar"] {
        if let Some(stem) = name.strip_suffix(suffix) {
            if !stem.is_empty() {
                return stem;
            }
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn layout_paths_follow_url() {
        let layout = CacheLayout::new("/srv/cache");
        let spec = ModelSpec::new(
            "det",
            url("https://example.com/models/PP-OCRv5_mobile_det_infer.tar"),
        );
        let asset = layout.asset(&spec).unwrap();
        assert_eq!(
            asset.local_cache_path,
            PathBuf::from("/srv/cache/tars/PP-OCRv5_mobile_det_infer.tar")
        );
        assert_eq!(
            layout.model_dir(&asset.local_cache_path),
            PathBuf::from("/srv/cache/official_models/PP-OCRv5_mobile_det_infer")
        );
    }

    #[test]
    fn layout_is_deterministic() {
        let layout = CacheLayout::new("cache");
        let spec = ModelSpec::new("rec", url("https://example.com/a/b.tgz"));
        assert_eq!(layout.asset(&spec).unwrap(), layout.asset(&spec).unwrap());
    }

    #[test]
    fn url_without_filename_is_rejected() {
        let layout = CacheLayout::new("cache");
        let spec = ModelSpec::new("det", url("https://example.com/"));
        assert!(matches!(
            layout.asset(&spec),
            Err(AcquireError::UnnamedAsset { .. })
        ));
    }

    #[test]
    fn stems() {
        assert_eq!(archive_stem("model.tar"), "model");
        assert_eq!(archive_stem("model.tar.gz"), "model");
        assert_eq!(archive_stem("model.tgz"), "model");
        assert_eq!(archive_stem("model.zip"), "model.zip");
        assert_eq!(archive_stem(".tar"), ".tar");
    }

    #[test]
    fn rename_rule_targets_global_model_name() {
        let rule = PatchRule::rename_model("a", "b");
        assert_eq!(rule.field_label(), "Global.model_name");
    }
}
