pub mod error;
pub mod models;
pub mod prompts;
pub mod steps;
pub mod workflow;

pub use error::{PlannerError, PlannerResult};
pub use models::{PlannerConfig, PlannerRun, Relevance, Stage, Terminal, WorkflowState};
pub use prompts::SchemaDescription;
pub use steps::{
    AnswerCase, AnswerFormatter, FunnyResponder, QuestionRewriter, RelevanceChecker,
    RelevanceVerdict, RewrittenQuestion, SqlExecutor, SqlStatement, SqlSynthesizer,
};
pub use workflow::PlannerWorkflow;
