use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LlmSection;

use super::{ChatMessage, ChatRequest, LanguageModel, LlmError, Role};

/// Client for an OpenAI-compatible chat-completions endpoint (Mistral by default).
#[derive(Clone)]
pub struct MistralModel {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    temperature: f32,
}

impl MistralModel {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: api_key.into(),
            temperature: 0.0,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Builds the client from `[llm]`, reading the key from the configured variable.
    pub fn from_config(section: &LlmSection) -> Result<Self, LlmError> {
        let api_key = std::env::var(&section.api_key_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| LlmError::MissingApiKey(section.api_key_env.clone()))?;
        Ok(Self::new(&section.endpoint, &section.model, api_key)
            .with_temperature(section.temperature))
    }

    fn body(&self, request: &ChatRequest) -> CompletionBody {
        let mut messages: Vec<WireMessage> = request.messages.iter().map(WireMessage::from).collect();
        let mut response_format = None;
        if let Some(schema) = request.schema {
            let contract = schema.instructions();
            match messages.iter_mut().find(|message| message.role == "system") {
                Some(system) => {
                    system.content.push_str("\n\n");
                    system.content.push_str(&contract);
                }
                None => messages.insert(
                    0,
                    WireMessage {
                        role: "system",
                        content: contract,
                    },
                ),
            }
            response_format = Some(ResponseFormat {
                kind: "json_object",
            });
        }
        CompletionBody {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            response_format,
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionBody {
    model: String,
    messages: Vec<WireMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        let role = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        Self {
            role,
            content: message.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LanguageModel for MistralModel {
    async fn complete(&self, request: ChatRequest) -> Result<String, LlmError> {
        let body = self.body(&request);
        debug!(target: "llm", model = %self.model, request = %request, "appel du modèle");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }
        let payload = response.json::<CompletionResponse>().await?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(LlmError::EmptyResponse)
    }
}
