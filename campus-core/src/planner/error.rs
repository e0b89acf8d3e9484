use thiserror::Error;

use crate::llm::LlmError;

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("language model error: {0}")]
    Llm(#[from] LlmError),
    #[error("sql execution task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type PlannerResult<T> = std::result::Result<T, PlannerError>;
