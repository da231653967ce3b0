//! # model-cache
//!
//! Download, unpack and repair pretrained OCR model archives so an inference
//! engine can load them from a plain local directory.
//!
//! ## How it works
//!
//! For each requested role (`"det"`, `"rec"`, …) [`ModelAcquisitionPipeline`]:
//!
//! 1. [`ArchiveStore`] checks `<cache>/tars/<archive>` for a complete archive
//!    and downloads it if absent. A `.fetched` sidecar records size and
//!    SHA-256 once the archive is fully on disk.
//! 2. [`ArchiveExtractor`] unpacks it into `<cache>/official_models/<stem>/`,
//!    stripping a redundant single top-level directory.
//! 3. [`ConfigPatcher`] relabels `Global.model_name` in `inference.yml` when
//!    it holds the expected old name, so the OCR engine's allow-list accepts
//!    the model.
//!
//! Every step is idempotent: a second run against the same cache performs no
//! network transfer, no extraction and no write.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use model_cache::{ModelAcquisitionPipeline, ModelSpec, PatchRule, Url};
//!
//! let pipeline = ModelAcquisitionPipeline::new("cache").expect("downloader");
//! let specs = [ModelSpec::new(
//!     "det",
//!     Url::parse("https://example.com/PP-OCRv5_mobile_det_infer.tar").unwrap(),
//! )
//! .with_patch(PatchRule::rename_model("PP-OCRv5_mobile_det", "PP-OCRv5_server_det"))];
//!
//! let dirs = pipeline.acquire(&specs).expect("models");
//! println!("detector at {}", dirs.get("det").unwrap().display());
//! ```
//!
//! Everything here is blocking; call it from `spawn_blocking` inside async code.

pub mod acquire;
pub mod asset;
pub mod error;
pub mod extract;
pub mod patch;
pub mod progress;
pub mod store;
pub mod transport;

pub use acquire::{ExtractionResult, ModelAcquisitionPipeline, ModelDirs};
pub use asset::{AssetSpec, CacheLayout, ModelSpec, PatchRule, DEFAULT_FIELD_PATH};
pub use error::{AcquireError, ExtractError, FetchError, PatchError};
pub use extract::{ArchiveExtractor, ExtractOutcome, ExtractStatus};
pub use patch::{ConfigPatcher, PatchOutcome, DEFAULT_CONFIG_FILE};
pub use progress::{AcquisitionProgress, NoProgress};
pub use store::{ArchiveStore, CacheStatus, FetchOutcome};
pub use transport::{DefaultTransport, FileTransport, HttpTransport, ProgressFn, Transport};

pub use reqwest::Url;
