//! Acquisition against `file://` fixtures: fetch, extract and patch in one go.

use model_cache::{
    AcquireError, AcquisitionProgress, CacheStatus, ExtractStatus, FetchError, FileTransport,
    ModelAcquisitionPipeline, ModelSpec, PatchOutcome, PatchRule, ProgressFn, Transport, Url,
};
use sha2::{Digest, Sha256};
use std::cell::{Cell, RefCell};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const DET_CONFIG: &str = "Global:\n  model_name: PP-OCRv5_mobile_det\nPostProcess:\n  name: DBPostProcess\n";
const REC_CONFIG: &str = "Global:\n  model_name: eslav_PP-OCRv5_mobile_rec\n";

/// Build `<dir>/<name>.tar` holding `<name>/inference.yml` and `<name>/inference.pdiparams`.
fn fixture_archive(dir: &Path, name: &str, config: &str) -> Url {
    let path = dir.join(format!("{name}.tar"));
    let mut builder = tar::Builder::new(fs::File::create(&path).unwrap());

    for (member, body) in [
        ("inference.yml", config.as_bytes()),
        ("inference.pdiparams", b"weights".as_slice()),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{name}/{member}"), body)
            .unwrap();
    }
    builder.into_inner().unwrap().flush().unwrap();

    Url::from_file_path(&path).unwrap()
}

fn det_spec(url: Url) -> ModelSpec {
    ModelSpec::new("det", url).with_patch(PatchRule::rename_model(
        "PP-OCRv5_mobile_det",
        "PP-OCRv5_server_det",
    ))
}

fn rec_spec(url: Url) -> ModelSpec {
    ModelSpec::new("rec", url).with_patch(PatchRule::rename_model(
        "eslav_PP-OCRv5_mobile_rec",
        "PP-OCRv5_server_rec",
    ))
}

/// Counts transfers so a warm cache can be shown to do none.
#[derive(Default)]
struct CountingTransport {
    fetches: Cell<usize>,
}

impl Transport for CountingTransport {
    fn fetch(
        &self,
        url: &Url,
        sink: &mut dyn Write,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<u64, FetchError> {
        self.fetches.set(self.fetches.get() + 1);
        FileTransport.fetch(url, sink, on_progress)
    }
}

#[derive(Default)]
struct RecordingProgress {
    events: RefCell<Vec<String>>,
}

impl AcquisitionProgress for RecordingProgress {
    fn on_fetch_complete(&self, role: &str, _archive: &Path, status: CacheStatus) {
        self.events.borrow_mut().push(format!("{role}:fetch:{status:?}"));
    }

    fn on_fetch_failed(&self, role: &str, _error: &str) {
        self.events.borrow_mut().push(format!("{role}:fetch:failed"));
    }

    fn on_extract_start(&self, role: &str, _archive: &Path, _directory: &Path) {
        self.events.borrow_mut().push(format!("{role}:extract:start"));
    }

    fn on_extract_complete(&self, role: &str, _directory: &Path, status: ExtractStatus) {
        self.events.borrow_mut().push(format!("{role}:extract:{status:?}"));
    }

    fn on_patch_complete(&self, role: &str, outcome: &PatchOutcome) {
        self.events.borrow_mut().push(format!("{role}:patch:{outcome}"));
    }
}

fn model_name(dir: &Path) -> String {
    let text = fs::read_to_string(dir.join("inference.yml")).unwrap();
    let doc: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
    doc["Global"]["model_name"].as_str().unwrap().to_string()
}

#[test]
fn acquires_patches_and_flattens_both_models() {
    let fixtures = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let det = fixture_archive(fixtures.path(), "PP-OCRv5_mobile_det_infer", DET_CONFIG);
    let rec = fixture_archive(fixtures.path(), "eslav_PP-OCRv5_mobile_rec_infer", REC_CONFIG);

    let pipeline = ModelAcquisitionPipeline::new(cache.path()).unwrap();
    let dirs = pipeline.acquire(&[det_spec(det), rec_spec(rec)]).unwrap();

    assert_eq!(dirs.roles().collect::<Vec<_>>(), vec!["det", "rec"]);
    assert!(dirs
        .iter()
        .all(|m| m.directory.starts_with(cache.path()) && m.patch.is_some()));

    let det_dir = dirs.get("det").unwrap();
    assert_eq!(
        det_dir,
        cache
            .path()
            .join("official_models")
            .join("PP-OCRv5_mobile_det_infer")
    );
    // Single top-level directory was stripped.
    assert!(det_dir.join("inference.pdiparams").is_file());
    assert!(!det_dir.join("PP-OCRv5_mobile_det_infer").exists());

    assert_eq!(model_name(det_dir), "PP-OCRv5_server_det");
    assert_eq!(model_name(dirs.get("rec").unwrap()), "PP-OCRv5_server_rec");
    assert_eq!(
        dirs.result("det").unwrap().patch,
        Some(Ok(PatchOutcome::Patched))
    );

    assert!(cache
        .path()
        .join("tars")
        .join("PP-OCRv5_mobile_det_infer.tar")
        .is_file());
}

#[test]
fn warm_cache_does_no_transfer_and_no_rewrite() {
    let fixtures = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let det = fixture_archive(fixtures.path(), "PP-OCRv5_mobile_det_infer", DET_CONFIG);
    let specs = [det_spec(det)];

    let transport = CountingTransport::default();
    let pipeline = ModelAcquisitionPipeline::with_transport(cache.path(), &transport);

    let first = pipeline.acquire(&specs).unwrap();
    assert_eq!(transport.fetches.get(), 1);
    let config: PathBuf = first.get("det").unwrap().join("inference.yml");
    let patched = fs::read(&config).unwrap();

    let progress = RecordingProgress::default();
    let second = pipeline.acquire_with_progress(&specs, &progress).unwrap();

    assert_eq!(transport.fetches.get(), 1, "second run must not download");
    assert_eq!(first.get("det"), second.get("det"));
    assert_eq!(fs::read(&config).unwrap(), patched);
    assert_eq!(
        *progress.events.borrow(),
        vec![
            "det:fetch:Hit".to_string(),
            "det:extract:start".to_string(),
            "det:extract:AlreadyPresent".to_string(),
            "det:patch:already patched".to_string(),
        ]
    );
}

#[test]
fn failed_second_role_keeps_the_first() {
    let fixtures = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let det = fixture_archive(fixtures.path(), "PP-OCRv5_mobile_det_infer", DET_CONFIG);
    let missing = Url::from_file_path(fixtures.path().join("missing_rec_infer.tar")).unwrap();

    let pipeline = ModelAcquisitionPipeline::with_transport(cache.path(), FileTransport);
    let progress = RecordingProgress::default();
    let err = pipeline
        .acquire_with_progress(&[det_spec(det), rec_spec(missing)], &progress)
        .unwrap_err();
    assert_eq!(progress.events.borrow().last().unwrap(), "rec:fetch:failed");

    match err {
        AcquireError::Fetch { role, .. } => assert_eq!(role, "rec"),
        other => panic!("unexpected error: {other}"),
    }

    let det_dir = cache
        .path()
        .join("official_models")
        .join("PP-OCRv5_mobile_det_infer");
    assert!(det_dir.join("inference.yml").is_file());
    assert!(!cache.path().join("tars").join("missing_rec_infer.tar").exists());
}

#[test]
fn checksum_mismatch_is_fatal_for_the_role() {
    let fixtures = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let det = fixture_archive(fixtures.path(), "PP-OCRv5_mobile_det_infer", DET_CONFIG);
    let spec = det_spec(det).with_sha256("00".repeat(32));

    let pipeline = ModelAcquisitionPipeline::with_transport(cache.path(), FileTransport);
    let err = pipeline.acquire(&[spec]).unwrap_err();

    assert!(matches!(
        err,
        AcquireError::Fetch {
            source: FetchError::ChecksumMismatch { .. },
            ..
        }
    ));
    assert!(!cache.path().join("official_models").exists());
}

fn sha256_hex(path: &Path) -> String {
    Sha256::digest(fs::read(path).unwrap())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

#[test]
fn new_release_replaces_the_extracted_model() {
    let fixtures = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let plain = |url: Url| ModelSpec::new("det", url);

    let url = fixture_archive(fixtures.path(), "m", "Global:\n  model_name: v1\n");
    let pipeline = ModelAcquisitionPipeline::with_transport(cache.path(), FileTransport);
    let first = pipeline.acquire(&[plain(url)]).unwrap();
    assert_eq!(model_name(first.get("det").unwrap()), "v1");

    // Same archive name, new content, digest pinned to the new bytes.
    let url = fixture_archive(fixtures.path(), "m", "Global:\n  model_name: v2-new-release\n");
    let digest = sha256_hex(&url.to_file_path().unwrap());
    let progress = RecordingProgress::default();
    let second = pipeline
        .acquire_with_progress(&[plain(url).with_sha256(digest)], &progress)
        .unwrap();

    assert_eq!(
        *progress.events.borrow(),
        vec![
            "det:fetch:Downloaded".to_string(),
            "det:extract:start".to_string(),
            "det:extract:Extracted".to_string(),
        ]
    );
    assert_eq!(model_name(second.get("det").unwrap()), "v2-new-release");
}

#[test]
fn archive_from_another_mirror_is_not_reused() {
    let fixtures = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let primary = fixtures.path().join("primary");
    let mirror = fixtures.path().join("mirror");
    fs::create_dir_all(&primary).unwrap();
    fs::create_dir_all(&mirror).unwrap();

    let from_primary = fixture_archive(&primary, "m", "Global:\n  model_name: primary\n");
    let from_mirror = fixture_archive(&mirror, "m", "Global:\n  model_name: mirror\n");

    let transport = CountingTransport::default();
    let pipeline = ModelAcquisitionPipeline::with_transport(cache.path(), &transport);
    pipeline.acquire(&[ModelSpec::new("det", from_primary)]).unwrap();
    let dirs = pipeline.acquire(&[ModelSpec::new("det", from_mirror)]).unwrap();

    assert_eq!(transport.fetches.get(), 2);
    assert_eq!(model_name(dirs.get("det").unwrap()), "mirror");
}
