//! Translation orchestrator.
//!
//! Tries the generative model first when one is available and falls back to
//! the rule translator otherwise. `convert` never returns an error: every
//! fault ends up as [`TranslationResult::Failure`].

use crate::config::ModelConfig;
use crate::model::{translate_by_model, OllamaModel, SqlModel};
use crate::rules::{Entities, RuleTranslator};
use crate::schema::{self, SchemaDescriptor};
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Which translator produced a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslationSource {
    Model,
    Rules,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TranslationResult {
    Success {
        sql_text: String,
        extracted_entities: Entities,
        matched_terms: Vec<String>,
        source: TranslationSource,
    },
    Failure {
        reason: String,
    },
}

impl TranslationResult {
    pub fn sql(&self) -> Option<&str> {
        match self {
            TranslationResult::Success { sql_text, .. } => Some(sql_text),
            TranslationResult::Failure { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TranslationResult::Success { .. })
    }
}

/// `true` when `sql` has exactly one `;` and it is the last character.
pub fn is_single_statement(sql: &str) -> bool {
    let trimmed = sql.trim_end();
    trimmed.ends_with(';') && trimmed.matches(';').count() == 1
}

enum ModelSource {
    Disabled,
    Ollama(ModelConfig),
    Ready(Arc<dyn SqlModel>),
}

/// Natural language to SQL front door.
///
/// The model is acquired on first use, at most once. When acquisition fails
/// the model path stays disabled for the lifetime of the translator.
pub struct Translator {
    schema: Arc<SchemaDescriptor>,
    source: ModelSource,
    model: OnceCell<Option<Arc<dyn SqlModel>>>,
}

impl Translator {
    /// Translator that never consults a model.
    pub fn rules_only() -> Self {
        Self::build(ModelSource::Disabled)
    }

    /// Translator configured from `[model]` settings.
    pub fn from_config(config: &ModelConfig) -> Self {
        if config.enabled {
            Self::build(ModelSource::Ollama(config.clone()))
        } else {
            Self::rules_only()
        }
    }

    /// Translator backed by an already constructed model.
    pub fn with_model(model: Arc<dyn SqlModel>) -> Self {
        Self::build(ModelSource::Ready(model))
    }

    fn build(source: ModelSource) -> Self {
        Self {
            schema: Arc::new(schema::employees().clone()),
            source,
            model: OnceCell::new(),
        }
    }

    pub fn with_schema(mut self, schema: SchemaDescriptor) -> Self {
        self.schema = Arc::new(schema);
        self
    }

    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    async fn model(&self) -> Option<Arc<dyn SqlModel>> {
        self.model
            .get_or_init(|| async {
                match &self.source {
                    ModelSource::Disabled => None,
                    ModelSource::Ready(model) => Some(Arc::clone(model)),
                    ModelSource::Ollama(config) => match OllamaModel::acquire(config).await {
                        Ok(model) => Some(Arc::new(model) as Arc<dyn SqlModel>),
                        Err(e) => {
                            warn!(error = %e, "model unavailable, using rules from now on");
                            None
                        }
                    },
                }
            })
            .await
            .clone()
    }

    /// Whether the model path is usable. Triggers acquisition on first call.
    pub async fn model_available(&self) -> bool {
        self.model().await.is_some()
    }

    /// Translate `text` into SQL.
    pub async fn convert(&self, text: &str) -> TranslationResult {
        let text = text.trim();
        info!(query = text, "translating");

        if let Some(sql) = self.try_model(text).await {
            info!(sql = %sql, "model SQL");
            return TranslationResult::Success {
                sql_text: sql,
                extracted_entities: Entities::new(),
                matched_terms: Vec::new(),
                source: TranslationSource::Model,
            };
        }

        let schema = &self.schema;
        let translated = panic::catch_unwind(AssertUnwindSafe(|| {
            RuleTranslator::new(schema).translate(text)
        }));
        match translated {
            Ok(found) => {
                info!(sql = %found.sql, rule = found.rule, "rule SQL");
                TranslationResult::Success {
                    sql_text: found.sql,
                    extracted_entities: found.entities,
                    matched_terms: found.matched_terms,
                    source: TranslationSource::Rules,
                }
            }
            Err(payload) => TranslationResult::Failure {
                reason: panic_reason(payload.as_ref()),
            },
        }
    }

    async fn try_model(&self, text: &str) -> Option<String> {
        let model = self.model().await?;
        let schema = Arc::clone(&self.schema);
        let owned = text.to_string();

        let task = tokio::spawn(async move {
            translate_by_model(model.as_ref(), &owned, &schema).await
        });
        match task.await {
            Ok(Some(sql)) if is_single_statement(&sql) => Some(sql),
            Ok(Some(sql)) => {
                warn!(sql = %sql, "model produced more than one statement, using rules");
                None
            }
            Ok(None) => {
                debug!("no usable model SQL, using rules");
                None
            }
            Err(e) => {
                warn!(error = %e, "model task failed, using rules");
                None
            }
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "translation panicked".to_string()
    }
}
