pub mod error;
pub mod retrieval;

use async_trait::async_trait;

pub use error::{AgentError, AgentResult};
pub use retrieval::{format_contexts, HttpRetriever, RetrievalAgent, Retriever};

/// A sub-agent answering free-form questions in its own domain.
#[async_trait]
pub trait KnowledgeAgent: Send + Sync {
    fn name(&self) -> &str;

    async fn ask(&self, query: &str) -> AgentResult<String>;
}
