pub mod guard;
pub mod mistral;
pub mod scripted;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::LlmSection;

pub use guard::{CircuitBreakerConfig, GuardedModel};
pub use mistral::MistralModel;
pub use scripted::ScriptedModel;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("model returned no choices")]
    EmptyResponse,
    #[error("api key missing: set {0}")]
    MissingApiKey(String),
    #[error("timeout after {0:?}")]
    Timeout(std::time::Duration),
    #[error("circuit open, language model calls suspended")]
    CircuitOpen,
    #[error("response does not match schema {schema}: {raw}")]
    MalformedOutput { schema: &'static str, raw: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Record shape a structured completion must conform to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSchema {
    pub name: &'static str,
    pub fields: &'static [(&'static str, &'static str)],
}

impl OutputSchema {
    /// Plain-text contract appended to the system prompt of structured calls.
    pub fn instructions(&self) -> String {
        let fields = self
            .fields
            .iter()
            .map(|(name, description)| format!("  \"{name}\": <texte> // {description}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "Réponds exclusivement avec un objet JSON `{}` de la forme :\n{{\n{}\n}}",
            self.name, fields
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub schema: Option<OutputSchema>,
}

impl ChatRequest {
    pub fn text(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            schema: None,
        }
    }

    pub fn structured(messages: Vec<ChatMessage>, schema: OutputSchema) -> Self {
        Self {
            messages,
            schema: Some(schema),
        }
    }

    pub fn label(&self) -> &'static str {
        self.schema.map(|schema| schema.name).unwrap_or("text")
    }
}

impl fmt::Display for ChatRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} messages)", self.label(), self.messages.len())
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError>;
}

pub trait StructuredOutput: DeserializeOwned {
    const SCHEMA: OutputSchema;
}

/// Configured chat model behind the deadline and circuit breaker.
pub fn model_from_config(section: &LlmSection) -> Result<Arc<dyn LanguageModel>, LlmError> {
    let inner: Arc<dyn LanguageModel> = Arc::new(MistralModel::from_config(section)?);
    Ok(Arc::new(GuardedModel::new(
        inner,
        section.timeout(),
        CircuitBreakerConfig::from(&section.breaker),
    )))
}

pub async fn complete_text(
    model: &dyn LanguageModel,
    messages: Vec<ChatMessage>,
) -> Result<String, LlmError> {
    let text = model.complete(ChatRequest::text(messages)).await?;
    Ok(text.trim().to_string())
}

pub async fn complete_structured<T: StructuredOutput>(
    model: &dyn LanguageModel,
    messages: Vec<ChatMessage>,
) -> Result<T, LlmError> {
    let raw = model
        .complete(ChatRequest::structured(messages, T::SCHEMA))
        .await?;
    parse_structured(&raw)
}

/// Parses a structured reply, tolerating prose or code fences around the JSON object.
pub fn parse_structured<T: StructuredOutput>(raw: &str) -> Result<T, LlmError> {
    let trimmed = raw.trim();
    if let Ok(value) = serde_json::from_str::<T>(trimmed) {
        return Ok(value);
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            match serde_json::from_str::<T>(&trimmed[start..=end]) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    debug!(target: "llm", schema = T::SCHEMA.name, "extraction failed: {err}")
                }
            }
        }
    }
    Err(LlmError::MalformedOutput {
        schema: T::SCHEMA.name,
        raw: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Probe {
        value: String,
    }

    impl StructuredOutput for Probe {
        const SCHEMA: OutputSchema = OutputSchema {
            name: "probe",
            fields: &[("value", "une valeur")],
        };
    }

    #[test]
    fn parses_plain_json() {
        let probe: Probe = parse_structured(r#"{"value": "ok"}"#).unwrap();
        assert_eq!(probe.value, "ok");
    }

    #[test]
    fn parses_fenced_json() {
        let raw = "Voici la réponse :\n```json\n{\"value\": \"fenced\"}\n```";
        let probe: Probe = parse_structured(raw).unwrap();
        assert_eq!(probe.value, "fenced");
    }

    #[test]
    fn malformed_reply_is_reported() {
        let err = parse_structured::<Probe>("SELECT * FROM edt").unwrap_err();
        match err {
            LlmError::MalformedOutput { schema, raw } => {
                assert_eq!(schema, "probe");
                assert_eq!(raw, "SELECT * FROM edt");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wrong_field_is_malformed() {
        let err = parse_structured::<Probe>(r#"{"other": 1}"#).unwrap_err();
        assert!(matches!(err, LlmError::MalformedOutput { .. }));
    }

    #[test]
    fn schema_instructions_list_fields() {
        let text = Probe::SCHEMA.instructions();
        assert!(text.contains("\"value\""));
        assert!(text.contains("probe"));
    }
}
