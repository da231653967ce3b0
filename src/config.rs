//! Configuration types for PDF-to-SQL generation.
//!
//! Everything a run needs (where models are cached, which archives to fetch,
//! how to call PaddleOCR, which schema and LLM to use) lives in
//! [`Pdf2SqlConfig`], built via its [`Pdf2SqlConfigBuilder`]. Nothing is read
//! from module-level paths, so tests can point a run at a temporary directory.

use crate::error::Pdf2SqlError;
use edgequake_llm::LLMProvider;
use model_cache::{ModelSpec, PatchRule, Url, DEFAULT_CONFIG_FILE};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Role name of the text-detection model.
pub const DETECTOR_ROLE: &str = "det";

/// Role name of the text-recognition model.
pub const RECOGNIZER_ROLE: &str = "rec";

const PADDLEX_MODEL_BASE: &str =
    "https://paddle-model-ecology.bj.bcebos.com/paddlex/official_inference_model/paddle3.0.0";

/// `(role, archive, shipped model_name, name PaddleOCR accepts)`
const DEFAULT_MODELS: [(&str, &str, &str, &str); 2] = [
    (
        DETECTOR_ROLE,
        "PP-OCRv5_mobile_det_infer.tar",
        "PP-OCRv5_mobile_det",
        "PP-OCRv5_server_det",
    ),
    (
        RECOGNIZER_ROLE,
        "eslav_PP-OCRv5_mobile_rec_infer.tar",
        "eslav_PP-OCRv5_mobile_rec",
        "PP-OCRv5_server_rec",
    ),
];

/// The PP-OCRv5 mobile detector and East-Slavic recogniser, each relabelled
/// to a server model name so PaddleOCR's allow-list accepts it.
pub fn default_models() -> Vec<ModelSpec> {
    DEFAULT_MODELS
        .iter()
        .filter_map(|(role, archive, from, to)| {
            let url = Url::parse(&format!("{PADDLEX_MODEL_BASE}/{archive}")).ok()?;
            Some(ModelSpec::new(*role, url).with_patch(PatchRule::rename_model(*from, *to)))
        })
        .collect()
}

/// Configuration for one PDF-to-SQL run.
///
/// Built via [`Pdf2SqlConfig::builder()`] or using [`Pdf2SqlConfig::default()`].
///
/// # Example
/// ```rust
/// use pdf2sql::Pdf2SqlConfig;
///
/// let config = Pdf2SqlConfig::builder()
///     .cache_dir("/tmp/ocr-cache")
///     .schema_path("schemas/prices.yml")
///     .max_tokens(300)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct Pdf2SqlConfig {
    /// Root of the model cache. Default: `cache`.
    ///
    /// Archives land in `<cache_dir>/tars/`, extracted models in
    /// `<cache_dir>/official_models/<archive-stem>/`.
    pub cache_dir: PathBuf,

    /// Model archives to acquire, one per role. Default: [`default_models()`].
    pub models: Vec<ModelSpec>,

    /// Name of the config file patched inside each model directory. Default: `inference.yml`.
    pub model_config_file: String,

    /// Longest rendered page edge in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// PaddleOCR executable. Default: `paddleocr`.
    pub ocr_program: String,

    /// Recognised lines scoring below this are dropped. Range 0–1. Default: 0.0.
    pub min_line_score: f32,

    /// YAML schema document (table → column → type). Default: `config.yml`.
    pub schema_path: PathBuf,

    /// Custom few-shot block. If None, uses the built-in examples.
    pub few_shots: Option<String>,

    /// Custom system prompt. If None, uses the built-in instructions.
    pub system_prompt: Option<String>,

    /// LLM model identifier, e.g. "gpt-4.1-nano". If None, uses provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, the provider is detected from the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the LLM may generate. Default: 200.
    ///
    /// One INSERT with a handful of rows fits comfortably; a low cap also
    /// stops a model that starts inventing extra examples.
    pub max_tokens: usize,
}

impl Default for Pdf2SqlConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            models: default_models(),
            model_config_file: DEFAULT_CONFIG_FILE.to_string(),
            max_rendered_pixels: 2000,
            ocr_program: "paddleocr".to_string(),
            min_line_score: 0.0,
            schema_path: PathBuf::from("config.yml"),
            few_shots: None,
            system_prompt: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 200,
        }
    }
}

impl fmt::Debug for Pdf2SqlConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pdf2SqlConfig")
            .field("cache_dir", &self.cache_dir)
            .field(
                "models",
                &self.models.iter().map(|m| m.role.as_str()).collect::<Vec<_>>(),
            )
            .field("model_config_file", &self.model_config_file)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("ocr_program", &self.ocr_program)
            .field("min_line_score", &self.min_line_score)
            .field("schema_path", &self.schema_path)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Pdf2SqlConfig {
    /// Create a new builder for `Pdf2SqlConfig`.
    pub fn builder() -> Pdf2SqlConfigBuilder {
        Pdf2SqlConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`Pdf2SqlConfig`].
#[derive(Debug)]
pub struct Pdf2SqlConfigBuilder {
    config: Pdf2SqlConfig,
}

impl Pdf2SqlConfigBuilder {
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache_dir = dir.into();
        self
    }

    /// Replace the whole model table.
    pub fn models(mut self, models: Vec<ModelSpec>) -> Self {
        self.config.models = models;
        self
    }

    /// Add a model, replacing any existing spec with the same role.
    pub fn model_spec(mut self, spec: ModelSpec) -> Self {
        self.config.models.retain(|m| m.role != spec.role);
        self.config.models.push(spec);
        self
    }

    pub fn model_config_file(mut self, name: impl Into<String>) -> Self {
        self.config.model_config_file = name.into();
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn ocr_program(mut self, program: impl Into<String>) -> Self {
        self.config.ocr_program = program.into();
        self
    }

    pub fn min_line_score(mut self, score: f32) -> Self {
        self.config.min_line_score = score.clamp(0.0, 1.0);
        self
    }

    pub fn schema_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.schema_path = path.into();
        self
    }

    pub fn few_shots(mut self, examples: impl Into<String>) -> Self {
        self.config.few_shots = Some(examples.into());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<Pdf2SqlConfig, Pdf2SqlError> {
        let c = &self.config;
        if c.models.is_empty() {
            return Err(Pdf2SqlError::InvalidConfig(
                "At least one OCR model must be configured".into(),
            ));
        }

        let mut roles = HashSet::new();
        for spec in &c.models {
            if !roles.insert(spec.role.as_str()) {
                return Err(Pdf2SqlError::InvalidConfig(format!(
                    "Model role '{}' is configured more than once",
                    spec.role
                )));
            }
        }
        for required in [DETECTOR_ROLE, RECOGNIZER_ROLE] {
            if !roles.contains(required) {
                return Err(Pdf2SqlError::InvalidConfig(format!(
                    "No model configured for role '{required}'"
                )));
            }
        }

        if c.max_tokens == 0 {
            return Err(Pdf2SqlError::InvalidConfig("Max tokens must be ≥ 1".into()));
        }
        if c.ocr_program.trim().is_empty() {
            return Err(Pdf2SqlError::InvalidConfig(
                "OCR program must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
