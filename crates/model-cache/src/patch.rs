//! Targeted rewrites of a model's `inference.yml`.
//!
//! PaddleOCR refuses to load a model whose `Global.model_name` is not on its
//! allow-list, even when the weights are compatible. The patcher relabels such
//! models to an accepted name. It only ever rewrites a field that holds the
//! exact expected old value; anything else is reported and left untouched.

use crate::asset::PatchRule;
use crate::error::PatchError;
use serde_yaml::Value;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Config file shipped inside PaddleX inference model directories.
pub const DEFAULT_CONFIG_FILE: &str = "inference.yml";

/// Result of [`ConfigPatcher::ensure_patched`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    /// The field already holds the target value. Nothing was written.
    AlreadyPatched,
    /// The field held the expected old value and was rewritten.
    Patched,
    /// The field holds something unrecognised (carried here). Nothing was written.
    Skipped(String),
    /// The model directory has no config file.
    NotApplicable,
}

impl fmt::Display for PatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchOutcome::AlreadyPatched => f.write_str("already patched"),
            PatchOutcome::Patched => f.write_str("patched"),
            PatchOutcome::Skipped(current) => write!(f, "skipped (found '{current}')"),
            PatchOutcome::NotApplicable => f.write_str("no config file"),
        }
    }
}

/// Placeholder reported when the field is missing from the document.
pub const ABSENT: &str = "<absent>";

/// Applies [`PatchRule`]s to a config file inside a model directory.
#[derive(Debug, Clone)]
pub struct ConfigPatcher {
    file_name: String,
}

impl Default for ConfigPatcher {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_FILE)
    }
}

impl ConfigPatcher {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    pub fn config_path(&self, model_dir: &Path) -> PathBuf {
        model_dir.join(&self.file_name)
    }

    /// Bring the field named by `rule` to `rule.to`, if it is safe to do so.
    pub fn ensure_patched(
        &self,
        model_dir: &Path,
        rule: &PatchRule,
    ) -> Result<PatchOutcome, PatchError> {
        let path = self.config_path(model_dir);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(PatchOutcome::NotApplicable);
            }
            Err(source) => return Err(PatchError::Read { path, source }),
        };

        let mut doc: Value = serde_yaml::from_str(&text).map_err(|e| PatchError::Parse {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        let field = rule.field_label();
        let current = lookup(&doc, &rule.field_path).map(describe);

        match current.as_deref() {
            Some(value) if value == rule.to => {
                info!("Already patched: {} = {}", field, rule.to);
                return Ok(PatchOutcome::AlreadyPatched);
            }
            Some(value) if value == rule.from => {}
            other => {
                let found = other.unwrap_or(ABSENT).to_string();
                warn!(
                    "Unrecognised {} in {}: '{}' (expected '{}'); leaving it unchanged",
                    field,
                    path.display(),
                    found,
                    rule.from
                );
                return Ok(PatchOutcome::Skipped(found));
            }
        }

        if let Some(slot) = lookup_mut(&mut doc, &rule.field_path) {
            *slot = Value::String(rule.to.clone());
        }

        let rendered = serde_yaml::to_string(&doc).map_err(|e| PatchError::Parse {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        write_atomic(&path, &rendered)?;

        info!("Patched {}: {} → {}", field, rule.from, rule.to);
        Ok(PatchOutcome::Patched)
    }
}

fn lookup<'a>(doc: &'a Value, field_path: &[String]) -> Option<&'a Value> {
    field_path
        .iter()
        .try_fold(doc, |node, key| node.as_mapping()?.get(key.as_str()))
}

fn lookup_mut<'a>(doc: &'a mut Value, field_path: &[String]) -> Option<&'a mut Value> {
    field_path
        .iter()
        .try_fold(doc, |node, key| node.as_mapping_mut()?.get_mut(key.as_str()))
}

/// Scalar values compare by their text; anything else is rendered as YAML.
fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// Write through a temp file and rename so readers never see half a file.
fn write_atomic(path: &Path, contents: &str) -> Result<(), PatchError> {
    let tmp = path.with_extension("yml.tmp");
    fs::write(&tmp, contents).map_err(|source| PatchError::Write {
        path: tmp.clone(),
        source,
    })?;
    fs::rename(&tmp, path).map_err(|source| PatchError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DET_CONFIG: &str = "\
Global:
  model_name: PP-OCRv5_mobile_det
  comment: модель детекции
PreProcess:
  transform_ops:
  - DecodeImage:
      channel_first: false
      img_mode: BGR
PostProcess:
  name: DBPostProcess
  thresh: 0.3
";

    fn model_dir(config: Option<&str>) -> TempDir {
        let dir = TempDir::new().unwrap();
        if let Some(text) = config {
            fs::write(dir.path().join(DEFAULT_CONFIG_FILE), text).unwrap();
        }
        dir
    }

    fn rule() -> PatchRule {
        PatchRule::rename_model("PP-OCRv5_mobile_det", "PP-OCRv5_server_det")
    }

    fn model_name(dir: &Path) -> String {
        let text = fs::read_to_string(dir.join(DEFAULT_CONFIG_FILE)).unwrap();
        let doc: Value = serde_yaml::from_str(&text).unwrap();
        doc["Global"]["model_name"].as_str().unwrap().to_string()
    }

    #[test]
    fn patches_then_reports_already_patched() {
        let dir = model_dir(Some(DET_CONFIG));
        let patcher = ConfigPatcher::default();

        assert_eq!(
            patcher.ensure_patched(dir.path(), &rule()).unwrap(),
            PatchOutcome::Patched
        );
        assert_eq!(model_name(dir.path()), "PP-OCRv5_server_det");

        let before = fs::read(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(
            patcher.ensure_patched(dir.path(), &rule()).unwrap(),
            PatchOutcome::AlreadyPatched
        );
        let after = fs::read(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn rewrite_keeps_key_order_and_unicode() {
        let dir = model_dir(Some(DET_CONFIG));
        ConfigPatcher::default()
            .ensure_patched(dir.path(), &rule())
            .unwrap();

        let text = fs::read_to_string(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        let global = text.find("Global:").unwrap();
        let pre = text.find("PreProcess:").unwrap();
        let post = text.find("PostProcess:").unwrap();
        assert!(global < pre && pre < post, "order changed:\n{text}");
        assert!(text.contains("модель детекции"), "unicode escaped:\n{text}");
        assert!(text.contains("thresh: 0.3"));
    }

    #[test]
    fn unrecognised_value_is_left_alone() {
        let config = DET_CONFIG.replace("PP-OCRv5_mobile_det", "something-else");
        let dir = model_dir(Some(&config));

        let outcome = ConfigPatcher::default()
            .ensure_patched(dir.path(), &rule())
            .unwrap();

        assert_eq!(outcome, PatchOutcome::Skipped("something-else".into()));
        let text = fs::read_to_string(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert_eq!(text, config);
    }

    #[test]
    fn missing_field_is_skipped() {
        let dir = model_dir(Some("Global:\n  other: 1\n"));
        let outcome = ConfigPatcher::default()
            .ensure_patched(dir.path(), &rule())
            .unwrap();
        assert_eq!(outcome, PatchOutcome::Skipped(ABSENT.into()));
    }

    #[test]
    fn missing_config_is_not_applicable() {
        let dir = model_dir(None);
        let outcome = ConfigPatcher::default()
            .ensure_patched(dir.path(), &rule())
            .unwrap();
        assert_eq!(outcome, PatchOutcome::NotApplicable);
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let dir = model_dir(Some("Global: [unclosed\n"));
        let err = ConfigPatcher::default()
            .ensure_patched(dir.path(), &rule())
            .unwrap_err();
        assert!(matches!(err, PatchError::Parse { .. }));
    }

    #[test]
    fn custom_field_path() {
        let dir = model_dir(Some("Model:\n  arch:\n    name: old\n"));
        let rule = PatchRule {
            field_path: vec!["Model".into(), "arch".into(), "name".into()],
            from: "old".into(),
            to: "new".into(),
        };
        let outcome = ConfigPatcher::default()
            .ensure_patched(dir.path(), &rule)
            .unwrap();
        assert_eq!(outcome, PatchOutcome::Patched);
        let text = fs::read_to_string(dir.path().join(DEFAULT_CONFIG_FILE)).unwrap();
        assert!(text.contains("name: new"));
    }
}
