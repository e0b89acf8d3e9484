use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{debug, info, warn};

use crate::llm::LanguageModel;
use crate::schedule::{ExecutionOutcome, ScheduleStore};

use super::models::{PlannerConfig, PlannerRun, Relevance, Stage, Terminal, WorkflowState};
use super::prompts::SchemaDescription;
use super::steps::{
    AnswerFormatter, FunnyResponder, QuestionRewriter, RelevanceChecker, SqlExecutor,
    SqlSynthesizer,
};
use super::PlannerResult;

/// Relevance check, SQL synthesis and execution with a bounded regeneration loop.
///
/// Runs share nothing but the store and the model, so one workflow can serve
/// concurrent questions.
#[derive(Clone)]
pub struct PlannerWorkflow {
    relevance: RelevanceChecker,
    synthesizer: SqlSynthesizer,
    executor: SqlExecutor,
    rewriter: QuestionRewriter,
    formatter: AnswerFormatter,
    responder: FunnyResponder,
    config: PlannerConfig,
}

impl PlannerWorkflow {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        store: ScheduleStore,
        schema: SchemaDescription,
        config: PlannerConfig,
    ) -> Self {
        let schema = Arc::new(schema);
        Self {
            relevance: RelevanceChecker::new(model.clone(), schema.clone()),
            synthesizer: SqlSynthesizer::new(model.clone(), schema),
            executor: SqlExecutor::new(store, config.policy),
            rewriter: QuestionRewriter::new(model.clone()),
            formatter: AnswerFormatter::new(model.clone()),
            responder: FunnyResponder::new(model),
            config,
        }
    }

    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.config.reference_date = Some(date);
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Answers one question and returns only the final text.
    pub async fn run_planner(&self, question: &str) -> PlannerResult<String> {
        Ok(self.run(question).await?.state.result_text)
    }

    pub async fn run(&self, question: &str) -> PlannerResult<PlannerRun> {
        let today = self
            .config
            .reference_date
            .unwrap_or_else(|| Local::now().date_naive());
        let mut state = WorkflowState::new(question);
        let mut trace = Vec::new();
        let mut stage = Stage::CheckRelevance;

        let terminal = loop {
            trace.push(stage);
            debug!(target: "planner", %stage, attempts = state.attempts, "étape");
            stage = match stage {
                Stage::CheckRelevance => {
                    state.relevance = self.relevance.check(&state.question).await?;
                    info!(target: "planner", relevance = %state.relevance, "pertinence évaluée");
                    if state.relevance == Relevance::Relevant {
                        Stage::ConvertToSql
                    } else {
                        Stage::GenerateFunnyResponse
                    }
                }
                Stage::ConvertToSql => {
                    state.sql_query = self.synthesizer.synthesize(&state.question, today).await?;
                    debug!(target: "planner.sql", sql = %state.sql_query, "requête générée");
                    Stage::ExecuteSql
                }
                Stage::ExecuteSql => {
                    self.apply_outcome(&mut state).await?;
                    if state.sql_error {
                        Stage::RegenerateQuery
                    } else {
                        Stage::GenerateAnswer
                    }
                }
                Stage::RegenerateQuery => {
                    state.attempts += 1;
                    if state.attempts < self.config.max_attempts {
                        state.question = self.rewriter.rewrite(&state.question, today).await?;
                        info!(
                            target: "planner",
                            attempts = state.attempts,
                            question = %state.question,
                            "question reformulée"
                        );
                        Stage::ConvertToSql
                    } else {
                        Stage::GiveUp
                    }
                }
                Stage::GenerateAnswer => {
                    state.result_text = self
                        .formatter
                        .format(
                            &state.question,
                            &state.sql_query,
                            &state.result_text,
                            &state.result_rows,
                            state.sql_error,
                        )
                        .await?;
                    break Terminal::Answered;
                }
                Stage::GenerateFunnyResponse => {
                    state.result_text = self.responder.respond(&state.question).await?;
                    break Terminal::OffTopic;
                }
                Stage::GiveUp => {
                    warn!(
                        target: "planner",
                        attempts = state.attempts,
                        "nombre maximal de tentatives atteint"
                    );
                    state.result_rows.clear();
                    state.result_text = self.config.give_up_message.clone();
                    break Terminal::GaveUp;
                }
            };
        };

        info!(
            target: "planner",
            %terminal,
            attempts = state.attempts,
            stages = trace.len(),
            "workflow terminé"
        );
        Ok(PlannerRun {
            state,
            terminal,
            trace,
        })
    }

    async fn apply_outcome(&self, state: &mut WorkflowState) -> PlannerResult<()> {
        match self.executor.execute(&state.sql_query).await? {
            ExecutionOutcome::Rows { rows, summary } => {
                info!(target: "planner.sql", rows = rows.len(), "requête exécutée");
                state.result_rows = rows;
                state.result_text = summary;
                state.sql_error = false;
            }
            ExecutionOutcome::Applied { summary } => {
                info!(target: "planner.sql", "modification appliquée");
                state.result_rows.clear();
                state.result_text = summary;
                state.sql_error = false;
            }
            ExecutionOutcome::Failed { message } => {
                warn!(target: "planner.sql", attempts = state.attempts, "{message}");
                state.result_rows.clear();
                state.result_text = message;
                state.sql_error = true;
            }
        }
        Ok(())
    }
}
