//! Text generation: send the assembled prompt to a language model.
//!
//! [`TextGenerator`] is the seam between SQL generation and whatever produces
//! text. [`LlmGenerator`] is the production implementation over an
//! `edgequake-llm` provider; tests substitute a scripted generator.
//!
//! There is exactly one call per document and no retry: a failed call fails
//! the run with the provider's message.

use crate::config::Pdf2SqlConfig;
use crate::error::Pdf2SqlError;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Model used when a provider is named without a model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Raw model output plus token accounting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    pub text: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Produces a completion for a system prompt and a user prompt.
pub trait TextGenerator: Send + Sync {
    fn generate(
        &self,
        system: &str,
        prompt: &str,
    ) -> impl Future<Output = Result<Generation, Pdf2SqlError>> + Send;
}

/// [`TextGenerator`] backed by an `edgequake-llm` provider.
pub struct LlmGenerator {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>, temperature: f32, max_tokens: usize) -> Self {
        Self {
            provider,
            options: build_options(temperature, max_tokens),
        }
    }

    /// Resolve the provider from `config` and apply its sampling options.
    pub fn from_config(config: &Pdf2SqlConfig) -> Result<Self, Pdf2SqlError> {
        let provider = resolve_provider(config)?;
        Ok(Self::new(provider, config.temperature, config.max_tokens))
    }
}

impl TextGenerator for LlmGenerator {
    async fn generate(&self, system: &str, prompt: &str) -> Result<Generation, Pdf2SqlError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
        let start = Instant::now();

        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| Pdf2SqlError::LlmApiError {
                message: e.to_string(),
            })?;

        debug!(
            "LLM: {} input tokens, {} output tokens, {:?}",
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        Ok(Generation {
            text: response.content,
            input_tokens: response.prompt_tokens,
            output_tokens: response.completion_tokens,
        })
    }
}

fn build_options(temperature: f32, max_tokens: usize) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens),
        ..Default::default()
    }
}

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2SqlError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2SqlError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model`, or
///    [`DEFAULT_MODEL`] when no model is set.
/// 3. **Environment pair** (`EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`),
///    honoured only when both are set and non-empty.
/// 4. **Full auto-detection** (`ProviderFactory::from_env`), which picks the
///    first provider whose API key is present.
pub fn resolve_provider(config: &Pdf2SqlConfig) -> Result<Arc<dyn LLMProvider>, Pdf2SqlError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2SqlError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}
