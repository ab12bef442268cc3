//! Model-backed translation.
//!
//! A generative model is asked for SQL given the schema description and the
//! question. Anything that goes wrong (generation error, output without a
//! SELECT) yields `None` so the caller can fall back to the rule translator.

use crate::config::ModelConfig;
use crate::error::{Text2SqlError, Text2SqlResult};
use crate::schema::SchemaDescriptor;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Marker the prompt ends with; echoed output is cut after its last occurrence.
const SQL_MARKER: &str = "SQL:";

/// A text generator able to answer a prompt.
#[async_trait]
pub trait SqlModel: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Text2SqlResult<String>;

    /// Model name for logs.
    fn name(&self) -> &str;
}

/// Build the generation prompt.
pub fn build_prompt(text: &str, schema: &SchemaDescriptor) -> String {
    format!(
        "Translate the question into a single PostgreSQL SELECT statement.\n\
         Answer with SQL only, no explanation, no markdown.\n\n\
         Schema:\n{}\n\
         Question: {}\n\n\
         {}",
        schema.describe(),
        text,
        SQL_MARKER
    )
}

/// Normalize raw model output into a candidate statement.
///
/// Keeps the text after the last `SQL:` marker, strips code fences and
/// leaves exactly one trailing `;`.
pub fn clean_output(raw: &str) -> String {
    let tail = match raw.rfind(SQL_MARKER) {
        Some(idx) => &raw[idx + SQL_MARKER.len()..],
        None => raw,
    };
    let unfenced = tail.replace("```sql", "").replace("```SQL", "").replace("```", "");
    let body = unfenced.trim().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
    format!("{};", body)
}

/// Ask `model` for SQL. Returns `None` on any failure or when the cleaned
/// output contains no SELECT.
pub async fn translate_by_model(
    model: &dyn SqlModel,
    text: &str,
    schema: &SchemaDescriptor,
) -> Option<String> {
    let prompt = build_prompt(text, schema);
    let raw = match model.generate(&prompt).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(model = model.name(), error = %e, "model generation failed");
            return None;
        }
    };

    let sql = clean_output(&raw);
    if !sql.to_uppercase().contains("SELECT") {
        debug!(model = model.name(), output = %raw, "model output has no SELECT");
        return None;
    }
    Some(sql)
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Client for an Ollama-compatible `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaModel {
    client: reqwest::Client,
    endpoint: String,
    name: String,
    temperature: f32,
    max_new_tokens: u32,
}

impl OllamaModel {
    /// Check that the server is reachable and serves the configured model.
    pub async fn acquire(config: &ModelConfig) -> Text2SqlResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let endpoint = config.endpoint.trim_end_matches('/').to_string();

        let tags: TagsResponse = client
            .get(format!("{}/api/tags", endpoint))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let wanted = config.name.as_str();
        let served = tags
            .models
            .iter()
            .any(|m| m.name == wanted || m.name.split(':').next() == Some(wanted));
        if !served {
            return Err(Text2SqlError::model(format!(
                "model '{}' is not served by {}",
                wanted, endpoint
            )));
        }

        info!(model = wanted, endpoint = %endpoint, "model acquired");
        Ok(Self {
            client,
            endpoint,
            name: config.name.clone(),
            temperature: config.temperature,
            max_new_tokens: config.max_new_tokens,
        })
    }
}

#[async_trait]
impl SqlModel for OllamaModel {
    async fn generate(&self, prompt: &str) -> Text2SqlResult<String> {
        let request = GenerateRequest {
            model: &self.name,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_new_tokens,
            },
        };

        let response: GenerateResponse = self
            .client
            .post(format!("{}/api/generate", self.endpoint))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.response)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use pretty_assertions::assert_eq;

    struct Canned(Text2SqlResult<&'static str>);

    #[async_trait]
    impl SqlModel for Canned {
        async fn generate(&self, _prompt: &str) -> Text2SqlResult<String> {
            match &self.0 {
                Ok(s) => Ok(s.to_string()),
                Err(e) => Err(Text2SqlError::model(e.to_string())),
            }
        }

        fn name(&self) -> &str {
            "canned"
        }
    }

    #[test]
    fn test_prompt_embeds_schema_and_question() {
        let prompt = build_prompt("Сотрудники IT отдела", schema::employees());
        assert!(prompt.contains("Сотрудники IT отдела"));
        assert!(prompt.contains("hire_date"));
        assert!(prompt.trim_end().ends_with(SQL_MARKER));
    }

    #[test]
    fn test_clean_strips_fences() {
        assert_eq!(
            clean_output("```sql\nSELECT * FROM employees\n```"),
            "SELECT * FROM employees;"
        );
    }

    #[test]
    fn test_clean_single_terminator() {
        assert_eq!(clean_output("SELECT 1"), "SELECT 1;");
        assert_eq!(clean_output("SELECT 1;"), "SELECT 1;");
        assert_eq!(clean_output("SELECT 1 ; ;\n"), "SELECT 1;");
    }

    #[test]
    fn test_clean_cuts_echoed_prompt() {
        let raw = "Question: who?\n\nSQL: SELECT first_name FROM employees";
        assert_eq!(clean_output(raw), "SELECT first_name FROM employees;");
    }

    #[tokio::test]
    async fn test_translate_accepts_select() {
        let model = Canned(Ok("select * from employees"));
        let sql = translate_by_model(&model, "все", schema::employees()).await;
        assert_eq!(sql.as_deref(), Some("select * from employees;"));
    }

    #[tokio::test]
    async fn test_translate_without_select_is_none() {
        let model = Canned(Ok("I cannot answer that"));
        assert_eq!(translate_by_model(&model, "все", schema::employees()).await, None);
    }

    #[tokio::test]
    async fn test_translate_generation_error_is_none() {
        let model = Canned(Err(Text2SqlError::model("out of memory")));
        assert_eq!(translate_by_model(&model, "все", schema::employees()).await, None);
    }

    #[tokio::test]
    async fn test_acquire_unreachable_endpoint_fails() {
        let config = ModelConfig {
            endpoint: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            ..ModelConfig::default()
        };
        assert!(OllamaModel::acquire(&config).await.is_err());
    }
}
