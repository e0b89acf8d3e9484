pub mod agents;
pub mod assistant;
pub mod config;
pub mod error;
pub mod llm;
pub mod planner;
pub mod router;
pub mod schedule;
pub mod sqlite;

pub use agents::{
    format_contexts, AgentError, AgentResult, HttpRetriever, KnowledgeAgent, RetrievalAgent,
    Retriever,
};
pub use assistant::{
    AgentKind, Assistant, AssistantError, AssistantReply, AssistantResult, Exchange, Session,
    SessionRegistry, SharedSession,
};
pub use config::{
    load_assistant_config, AgentSection, AgentsSection, AssistantConfig, BreakerSection,
    ColumnSection, IngestSection, LlmSection, PathsSection, PlannerSection, ProgramMarker,
    SchemaSection, SystemSection,
};
pub use error::{ConfigError, Result};
pub use llm::{
    complete_structured, complete_text, model_from_config, ChatMessage, ChatRequest,
    CircuitBreakerConfig, GuardedModel, LanguageModel, LlmError, MistralModel, OutputSchema,
    Role, ScriptedModel, StructuredOutput,
};
pub use planner::{
    PlannerConfig, PlannerError, PlannerResult, PlannerRun, PlannerWorkflow, Relevance,
    SchemaDescription, Stage, Terminal, WorkflowState,
};
pub use router::{Intent, IntentRouter};
pub use schedule::{
    ExecutionOutcome, IngestError, ResultRow, ScheduleEntry, ScheduleStore, ScheduleStoreBuilder,
    SqlPolicy, StoreError, StoreResult,
};
