//! Fetch → extract → patch, one role at a time.

use crate::asset::{CacheLayout, ModelSpec};
use crate::error::AcquireError;
use crate::extract::ArchiveExtractor;
use crate::patch::{ConfigPatcher, PatchOutcome};
use crate::progress::{AcquisitionProgress, NoProgress};
use crate::store::ArchiveStore;
use crate::transport::{DefaultTransport, Transport};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// A ready-to-use model directory for one role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub role: String,
    pub directory: PathBuf,
    /// `None` when the role has no patch rule, `Err` when patching failed.
    pub patch: Option<Result<PatchOutcome, String>>,
}

/// Role → model directory mapping produced by [`ModelAcquisitionPipeline::acquire`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelDirs {
    models: BTreeMap<String, ExtractionResult>,
}

impl ModelDirs {
    pub fn get(&self, role: &str) -> Option<&Path> {
        self.models.get(role).map(|m| m.directory.as_path())
    }

    pub fn result(&self, role: &str) -> Option<&ExtractionResult> {
        self.models.get(role)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.models.values()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    fn insert(&mut self, result: ExtractionResult) {
        self.models.insert(result.role.clone(), result);
    }
}

/// Makes a fixed set of model roles available under a cache root.
///
/// Roles are processed sequentially. A fetch or extract failure stops the run
/// but leaves earlier roles on disk for the next attempt; patch anomalies are
/// logged and do not block the role.
pub struct ModelAcquisitionPipeline<T = DefaultTransport> {
    layout: CacheLayout,
    store: ArchiveStore<T>,
    extractor: ArchiveExtractor,
    patcher: ConfigPatcher,
}

impl ModelAcquisitionPipeline<DefaultTransport> {
    /// Pipeline using HTTP(S) and `file://` downloads.
    pub fn new(cache_root: impl Into<PathBuf>) -> Result<Self, AcquireError> {
        let transport = DefaultTransport::new().map_err(AcquireError::Setup)?;
        Ok(Self::with_transport(cache_root, transport))
    }
}

impl<T: Transport> ModelAcquisitionPipeline<T> {
    pub fn with_transport(cache_root: impl Into<PathBuf>, transport: T) -> Self {
        Self {
            layout: CacheLayout::new(cache_root),
            store: ArchiveStore::with_transport(transport),
            extractor: ArchiveExtractor::new(),
            patcher: ConfigPatcher::default(),
        }
    }

    /// Use a config file name other than `inference.yml`.
    pub fn with_patcher(mut self, patcher: ConfigPatcher) -> Self {
        self.patcher = patcher;
        self
    }

    pub fn layout(&self) -> &CacheLayout {
        &self.layout
    }

    /// Acquire every model in `specs` without progress reporting.
    pub fn acquire(&self, specs: &[ModelSpec]) -> Result<ModelDirs, AcquireError> {
        self.acquire_with_progress(specs, &NoProgress)
    }

    /// Acquire every model in `specs`, reporting each step to `progress`.
    pub fn acquire_with_progress(
        &self,
        specs: &[ModelSpec],
        progress: &dyn AcquisitionProgress,
    ) -> Result<ModelDirs, AcquireError> {
        let mut seen = HashSet::new();
        for spec in specs {
            if !seen.insert(spec.role.as_str()) {
                return Err(AcquireError::DuplicateRole(spec.role.clone()));
            }
        }

        let mut dirs = ModelDirs::default();
        for spec in specs {
            let result = self.acquire_one(spec, progress)?;
            dirs.insert(result);
        }

        info!("{} model(s) ready under {}", dirs.len(), self.layout.root().display());
        Ok(dirs)
    }

    fn acquire_one(
        &self,
        spec: &ModelSpec,
        progress: &dyn AcquisitionProgress,
    ) -> Result<ExtractionResult, AcquireError> {
        let role = spec.role.as_str();
        let asset = self.layout.asset(spec)?;

        progress.on_fetch_start(role, &spec.url);
        let on_bytes = |done: u64, total: Option<u64>| progress.on_fetch_progress(role, done, total);
        let fetched = self
            .store
            .ensure_fetched(&asset, Some(&on_bytes))
            .map_err(|source| {
                progress.on_fetch_failed(role, &source.to_string());
                AcquireError::Fetch {
                    role: role.to_string(),
                    source,
                }
            })?;
        progress.on_fetch_complete(role, &fetched.path, fetched.status);

        let dest = self.layout.model_dir(&fetched.path);
        progress.on_extract_start(role, &fetched.path, &dest);
        let extracted = self
            .extractor
            .ensure_extracted(&fetched.path, &dest)
            .map_err(|source| AcquireError::Extract {
                role: role.to_string(),
                source,
            })?;
        progress.on_extract_complete(role, &extracted.directory, extracted.status);

        let patch = spec.patch.as_ref().map(|rule| {
            match self.patcher.ensure_patched(&extracted.directory, rule) {
                Ok(outcome) => {
                    progress.on_patch_complete(role, &outcome);
                    Ok(outcome)
                }
                Err(e) => {
                    warn!(role, "Config patch failed, using model as-is: {}", e);
                    let msg = e.to_string();
                    progress.on_patch_error(role, &msg);
                    Err(msg)
                }
            }
        });

        Ok(ExtractionResult {
            role: role.to_string(),
            directory: extracted.directory,
            patch,
        })
    }
}
