use thiserror::Error;

use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("retrieval transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("retrieval endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("language model error: {0}")]
    Llm(#[from] LlmError),
}

pub type AgentResult<T> = std::result::Result<T, AgentError>;
