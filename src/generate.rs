//! SQL generation from recognised page text.
//!
//! [`SqlGenerator`] owns the schema (loaded once, at construction), the prompt
//! text and a [`TextGenerator`]. Given the OCR result for a document it builds
//! one prompt, makes one generation call and cuts the statement out of the
//! answer.

use crate::config::Pdf2SqlConfig;
use crate::error::Pdf2SqlError;
use crate::pipeline::llm::TextGenerator;
use crate::pipeline::ocr::{joined_text, PageText};
use crate::pipeline::postprocess::extract_sql;
use crate::prompts::{build_prompt, DEFAULT_FEW_SHOTS, DEFAULT_SYSTEM_PROMPT};
use crate::schema::DatabaseSchema;
use tracing::{info, warn};

/// A generated statement with the answer it was cut from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedSql {
    pub sql: String,
    pub raw_response: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

pub struct SqlGenerator<G> {
    schema: DatabaseSchema,
    system_prompt: String,
    few_shots: String,
    generator: G,
}

impl<G: TextGenerator> SqlGenerator<G> {
    /// Generator with the built-in system prompt and few-shot examples.
    pub fn new(schema: DatabaseSchema, generator: G) -> Self {
        Self {
            schema,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            few_shots: DEFAULT_FEW_SHOTS.to_string(),
            generator,
        }
    }

    /// Load the schema named by `config` and apply its prompt overrides.
    pub fn from_config(config: &Pdf2SqlConfig, generator: G) -> Result<Self, Pdf2SqlError> {
        let schema = DatabaseSchema::load(&config.schema_path)?;
        info!(
            "Schema {} targets table {:?}",
            schema.source().display(),
            schema.table_names().next().unwrap_or_default()
        );
        let mut this = Self::new(schema, generator);
        if let Some(ref prompt) = config.system_prompt {
            this.system_prompt = prompt.clone();
        }
        if let Some(ref shots) = config.few_shots {
            this.few_shots = shots.clone();
        }
        Ok(this)
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_few_shots(mut self, examples: impl Into<String>) -> Self {
        self.few_shots = examples.into();
        self
    }

    pub fn schema(&self) -> &DatabaseSchema {
        &self.schema
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// The user prompt that [`Self::generate_sql`] would send for `pages`.
    pub fn prompt_for(&self, pages: &[PageText]) -> String {
        build_prompt(&self.schema, &self.few_shots, &joined_text(pages))
    }

    /// Generate one SQL statement from the text of every page.
    ///
    /// Fails with [`Pdf2SqlError::NoTextRecognized`] without calling the model
    /// when no page has any text.
    pub async fn generate_sql(&self, pages: &[PageText]) -> Result<GeneratedSql, Pdf2SqlError> {
        if pages.iter().all(|p| p.lines.is_empty()) {
            return Err(Pdf2SqlError::NoTextRecognized { pages: pages.len() });
        }

        let prompt = self.prompt_for(pages);
        info!("Generating SQL from {} page(s)", pages.len());
        let generation = self.generator.generate(&self.system_prompt, &prompt).await?;

        match extract_sql(&generation.text) {
            Some(sql) => Ok(GeneratedSql {
                sql,
                raw_response: generation.text,
                input_tokens: generation.input_tokens,
                output_tokens: generation.output_tokens,
            }),
            None => {
                warn!("Model answer contained no SQL");
                Err(Pdf2SqlError::NoSqlGenerated {
                    response: generation.text,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::Generation;
    use crate::pipeline::ocr::RecognizedLine;
    use std::sync::Mutex;

    struct Echo {
        answer: String,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl Echo {
        fn new(answer: &str) -> Self {
            Self {
                answer: answer.to_string(),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl TextGenerator for Echo {
        async fn generate(&self, system: &str, prompt: &str) -> Result<Generation, Pdf2SqlError> {
            self.seen
                .lock()
                .unwrap()
                .push((system.to_string(), prompt.to_string()));
            Ok(Generation {
                text: self.answer.clone(),
                input_tokens: 10,
                output_tokens: 5,
            })
        }
    }

    fn schema() -> DatabaseSchema {
        DatabaseSchema::from_yaml_str("call_data:\n  price: FLOAT\n", "config.yml").unwrap()
    }

    fn page(num: usize, texts: &[&str]) -> PageText {
        PageText {
            page_num: num,
            lines: texts
                .iter()
                .map(|t| RecognizedLine {
                    text: t.to_string(),
                    score: 0.9,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn joins_pages_and_extracts_sql() {
        let generator = SqlGenerator::new(
            schema(),
            Echo::new("SQL: INSERT INTO call_data (price) VALUES (\"11.13\");"),
        );
        let pages = [page(1, &["3A", "11,13"]), page(2, &["01.11.2025"])];

        let out = generator.generate_sql(&pages).await.unwrap();

        assert_eq!(out.sql, "INSERT INTO call_data (price) VALUES (\"11.13\");");
        assert_eq!(out.input_tokens, 10);
        let seen = generator.generator.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, DEFAULT_SYSTEM_PROMPT);
        assert!(seen[0].1.contains("3A\n11,13\n01.11.2025"));
    }

    #[tokio::test]
    async fn empty_pages_skip_generation() {
        let generator = SqlGenerator::new(schema(), Echo::new("unused"));
        let err = generator
            .generate_sql(&[page(1, &[]), page(2, &[])])
            .await
            .unwrap_err();
        assert!(matches!(err, Pdf2SqlError::NoTextRecognized { pages: 2 }));
        assert!(generator.generator.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn blank_answer_is_no_sql() {
        let generator = SqlGenerator::new(schema(), Echo::new("```sql\n```"));
        let err = generator.generate_sql(&[page(1, &["x"])]).await.unwrap_err();
        assert!(matches!(err, Pdf2SqlError::NoSqlGenerated { .. }));
    }

    #[test]
    fn overrides_reach_the_prompt() {
        let generator = SqlGenerator::new(schema(), Echo::new(""))
            .with_system_prompt("custom system")
            .with_few_shots("EXAMPLE BLOCK");
        assert_eq!(generator.system_prompt(), "custom system");
        assert!(generator
            .prompt_for(&[page(1, &["t"])])
            .contains("EXAMPLE BLOCK"));
    }

    #[test]
    fn from_config_loads_schema() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "prices:\n  value: FLOAT\n").unwrap();
        let config = Pdf2SqlConfig::builder()
            .schema_path(&path)
            .few_shots("shots")
            .build()
            .unwrap();

        let generator = SqlGenerator::from_config(&config, Echo::new("")).unwrap();
        assert_eq!(generator.schema().table_names().next(), Some("prices"));
        assert_eq!(generator.schema().source(), path.as_path());
        assert!(generator.prompt_for(&[]).contains("shots"));
    }
}
