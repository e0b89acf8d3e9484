use thiserror::Error;

use crate::agents::AgentError;
use crate::llm::LlmError;
use crate::planner::PlannerError;
use crate::schedule::StoreError;

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("language model error: {0}")]
    Llm(#[from] LlmError),
    #[error("planner error: {0}")]
    Planner(#[from] PlannerError),
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),
    #[error("schedule store error: {0}")]
    Store(#[from] StoreError),
}

pub type AssistantResult<T> = std::result::Result<T, AssistantError>;
