use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::AgentSection;
use crate::llm::{complete_text, ChatMessage, LanguageModel};

use super::{AgentError, AgentResult, KnowledgeAgent};

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, n_results: usize) -> AgentResult<Vec<String>>;
}

#[derive(Debug, Serialize)]
struct RetrievalRequest<'a> {
    query: &'a str,
    n_results: usize,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Documents {
    Flat(Vec<String>),
    Nested(Vec<Vec<String>>),
}

#[derive(Debug, Deserialize)]
struct RetrievalResponse {
    documents: Documents,
}

impl RetrievalResponse {
    fn into_documents(self) -> Vec<String> {
        match self.documents {
            Documents::Flat(docs) => docs,
            Documents::Nested(groups) => groups.into_iter().next().unwrap_or_default(),
        }
    }
}

/// Queries a document-store search endpoint over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRetriever {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRetriever {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Retriever for HttpRetriever {
    async fn retrieve(&self, query: &str, n_results: usize) -> AgentResult<Vec<String>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&RetrievalRequest { query, n_results })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let parsed = response.json::<RetrievalResponse>().await?;
        Ok(parsed.into_documents())
    }
}

pub fn format_contexts(documents: &[String]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("Contexte {} :\n{}", i + 1, doc))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Retrieve-then-answer agent: one search, one completion.
pub struct RetrievalAgent {
    name: String,
    retriever: Arc<dyn Retriever>,
    model: Arc<dyn LanguageModel>,
    system_prompt: String,
    n_results: usize,
}

impl RetrievalAgent {
    pub fn new(
        name: impl Into<String>,
        retriever: Arc<dyn Retriever>,
        model: Arc<dyn LanguageModel>,
        system_prompt: impl Into<String>,
        n_results: usize,
    ) -> Self {
        Self {
            name: name.into(),
            retriever,
            model,
            system_prompt: system_prompt.into(),
            n_results,
        }
    }

    pub fn from_config(
        name: impl Into<String>,
        section: &AgentSection,
        model: Arc<dyn LanguageModel>,
    ) -> Self {
        Self::new(
            name,
            Arc::new(HttpRetriever::new(section.endpoint.clone())),
            model,
            section.system_prompt.trim(),
            section.n_results,
        )
    }
}

#[async_trait]
impl KnowledgeAgent for RetrievalAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ask(&self, query: &str) -> AgentResult<String> {
        let documents = self.retriever.retrieve(query, self.n_results).await?;
        info!(target: "agents", agent = %self.name, documents = documents.len(), "contextes récupérés");
        let contexts = format_contexts(&documents);
        debug!(target: "agents", agent = %self.name, "{contexts}");
        let user = format!("Contextes :\n{contexts}\n\nQuestion : {query}");
        let answer = complete_text(
            self.model.as_ref(),
            vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(user),
            ],
        )
        .await?;
        Ok(answer)
    }
}
