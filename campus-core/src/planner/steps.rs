use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use crate::llm::{
    complete_structured, complete_text, ChatMessage, LanguageModel, OutputSchema, StructuredOutput,
};
use crate::schedule::store::is_select;
use crate::schedule::{ExecutionOutcome, ResultRow, ScheduleStore, SqlPolicy};

use super::models::Relevance;
use super::prompts::{self, SchemaDescription};
use super::PlannerResult;

#[derive(Debug, Clone, Deserialize)]
pub struct RelevanceVerdict {
    pub relevance: String,
}

impl StructuredOutput for RelevanceVerdict {
    const SCHEMA: OutputSchema = OutputSchema {
        name: "check_relevance",
        fields: &[(
            "relevance",
            "\"relevant\" si la question porte sur l'emploi du temps, sinon \"not_relevant\"",
        )],
    };
}

#[derive(Debug, Clone, Deserialize)]
pub struct SqlStatement {
    pub sql_query: String,
}

impl StructuredOutput for SqlStatement {
    const SCHEMA: OutputSchema = OutputSchema {
        name: "convert_to_sql",
        fields: &[(
            "sql_query",
            "la requête SQL correspondant à la question en langage naturel",
        )],
    };
}

#[derive(Debug, Clone, Deserialize)]
pub struct RewrittenQuestion {
    pub question: String,
}

impl StructuredOutput for RewrittenQuestion {
    const SCHEMA: OutputSchema = OutputSchema {
        name: "rewritten_question",
        fields: &[("question", "la question reformulée")],
    };
}

/// Decides whether a question concerns the timetable table.
#[derive(Clone)]
pub struct RelevanceChecker {
    model: Arc<dyn LanguageModel>,
    schema: Arc<SchemaDescription>,
}

impl RelevanceChecker {
    pub fn new(model: Arc<dyn LanguageModel>, schema: Arc<SchemaDescription>) -> Self {
        Self { model, schema }
    }

    pub async fn check(&self, question: &str) -> PlannerResult<Relevance> {
        let verdict: RelevanceVerdict = complete_structured(
            self.model.as_ref(),
            vec![
                ChatMessage::system(prompts::relevance_system(&self.schema)),
                ChatMessage::user(format!("Question : {question}")),
            ],
        )
        .await?;
        Ok(Relevance::from_label(&verdict.relevance))
    }
}

/// Turns a natural-language question into one SQL statement.
#[derive(Clone)]
pub struct SqlSynthesizer {
    model: Arc<dyn LanguageModel>,
    schema: Arc<SchemaDescription>,
}

impl SqlSynthesizer {
    pub fn new(model: Arc<dyn LanguageModel>, schema: Arc<SchemaDescription>) -> Self {
        Self { model, schema }
    }

    pub async fn synthesize(&self, question: &str, today: NaiveDate) -> PlannerResult<String> {
        let statement: SqlStatement = complete_structured(
            self.model.as_ref(),
            vec![
                ChatMessage::system(prompts::text_to_sql_system(&self.schema, today)),
                ChatMessage::user(format!("Question : {question}")),
            ],
        )
        .await?;
        Ok(strip_code_fence(&statement.sql_query))
    }
}

fn strip_code_fence(sql: &str) -> String {
    let trimmed = sql.trim();
    let without_open = trimmed
        .strip_prefix("```sql")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open
        .strip_suffix("```")
        .unwrap_or(without_open)
        .trim()
        .to_string()
}

/// Runs statements against the timetable off the async runtime.
#[derive(Debug, Clone)]
pub struct SqlExecutor {
    store: ScheduleStore,
    policy: SqlPolicy,
}

impl SqlExecutor {
    pub fn new(store: ScheduleStore, policy: SqlPolicy) -> Self {
        Self { store, policy }
    }

    pub async fn execute(&self, sql: &str) -> PlannerResult<ExecutionOutcome> {
        let store = self.store.clone();
        let policy = self.policy;
        let sql = sql.to_string();
        let outcome = tokio::task::spawn_blocking(move || store.execute(&sql, policy)).await?;
        Ok(outcome)
    }
}

#[derive(Clone)]
pub struct QuestionRewriter {
    model: Arc<dyn LanguageModel>,
}

impl QuestionRewriter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn rewrite(&self, question: &str, today: NaiveDate) -> PlannerResult<String> {
        let rewritten: RewrittenQuestion = complete_structured(
            self.model.as_ref(),
            vec![
                ChatMessage::system(prompts::rewrite_system(today)),
                ChatMessage::user(prompts::rewrite_user(question)),
            ],
        )
        .await?;
        Ok(rewritten.question.trim().to_string())
    }
}

/// Which of the four answer phrasings applies to an execution result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerCase {
    Error,
    Empty,
    Rows,
    Confirmation,
}

impl AnswerCase {
    pub fn classify(sql_query: &str, rows: &[ResultRow], sql_error: bool) -> Self {
        if sql_error {
            AnswerCase::Error
        } else if is_select(sql_query) {
            if rows.is_empty() {
                AnswerCase::Empty
            } else {
                AnswerCase::Rows
            }
        } else {
            AnswerCase::Confirmation
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            AnswerCase::Error => prompts::ANSWER_ERROR,
            AnswerCase::Empty => prompts::ANSWER_EMPTY,
            AnswerCase::Rows => prompts::ANSWER_ROWS,
            AnswerCase::Confirmation => prompts::ANSWER_CONFIRMATION,
        }
    }
}

#[derive(Clone)]
pub struct AnswerFormatter {
    model: Arc<dyn LanguageModel>,
}

impl AnswerFormatter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn format(
        &self,
        question: &str,
        sql_query: &str,
        result_text: &str,
        rows: &[ResultRow],
        sql_error: bool,
    ) -> PlannerResult<String> {
        let case = AnswerCase::classify(sql_query, rows, sql_error);
        debug!(target: "planner", ?case, "formulation de la réponse");
        let user = format!(
            "Question : {question}\nRequête SQL :\n{sql_query}\n\nRésultat :\n{result_text}\n\n{}",
            case.instruction()
        );
        let answer = complete_text(
            self.model.as_ref(),
            vec![
                ChatMessage::system(prompts::ANSWER_SYSTEM),
                ChatMessage::user(user),
            ],
        )
        .await?;
        Ok(answer)
    }
}

/// Playful reply for questions outside the timetable.
#[derive(Clone)]
pub struct FunnyResponder {
    model: Arc<dyn LanguageModel>,
}

impl FunnyResponder {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn respond(&self, question: &str) -> PlannerResult<String> {
        let reply = complete_text(
            self.model.as_ref(),
            vec![
                ChatMessage::system(prompts::OFF_TOPIC_SYSTEM),
                ChatMessage::user(format!("Question : {question}")),
            ],
        )
        .await?;
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedModel;
    use crate::llm::Role;
    use serde_json::Value;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    #[tokio::test]
    async fn relevance_reply_is_mapped() {
        let model = Arc::new(ScriptedModel::new([
            r#"{"relevance": "relevant"}"#,
            r#"{"relevance": "not_relevant"}"#,
        ]));
        let checker = RelevanceChecker::new(model.clone(), Arc::new(SchemaDescription::timetable()));
        assert_eq!(checker.check("cours lundi ?").await.unwrap(), Relevance::Relevant);
        assert_eq!(checker.check("une blague ?").await.unwrap(), Relevance::NotRelevant);
        assert_eq!(model.labels(), vec!["check_relevance", "check_relevance"]);
    }

    #[tokio::test]
    async fn synthesizer_strips_fences_and_sends_schema() {
        let model = Arc::new(ScriptedModel::new([
            r#"{"sql_query": "```sql\nSELECT course FROM edt;\n```"}"#,
        ]));
        let synthesizer = SqlSynthesizer::new(model.clone(), Arc::new(SchemaDescription::timetable()));
        let sql = synthesizer.synthesize("Quels cours ?", today()).await.unwrap();
        assert_eq!(sql, "SELECT course FROM edt;");
        let requests = model.requests();
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert!(requests[0].messages[0].content.contains("table appelée edt"));
    }

    #[tokio::test]
    async fn rewriter_trims_reply() {
        let model = Arc::new(ScriptedModel::new([
            r#"{"question": "  Quels cours ai-je le 2025-03-11 ?  "}"#,
        ]));
        let rewriter = QuestionRewriter::new(model.clone());
        let question = rewriter.rewrite("Quels cours demain ?", today()).await.unwrap();
        assert_eq!(question, "Quels cours ai-je le 2025-03-11 ?");
        assert!(model.requests()[0].messages[0].content.contains("2025-03-10"));
    }

    #[test]
    fn answer_cases() {
        let mut row = ResultRow::new();
        row.insert("course".into(), Value::from("Stat"));
        assert_eq!(AnswerCase::classify("SELECT 1", &[], true), AnswerCase::Error);
        assert_eq!(AnswerCase::classify("select * from edt", &[], false), AnswerCase::Empty);
        assert_eq!(AnswerCase::classify(" SELECT course FROM edt", &[row], false), AnswerCase::Rows);
        assert_eq!(
            AnswerCase::classify("UPDATE edt SET room = 'A'", &[], false),
            AnswerCase::Confirmation
        );
    }

    #[tokio::test]
    async fn formatter_uses_matching_instruction() {
        let model = Arc::new(ScriptedModel::new(["  Aucun cours trouvé.  "]));
        let formatter = AnswerFormatter::new(model.clone());
        let answer = formatter
            .format("Cours dimanche ?", "SELECT * FROM edt", "No results found.", &[], false)
            .await
            .unwrap();
        assert_eq!(answer, "Aucun cours trouvé.");
        let request = &model.requests()[0];
        assert!(request.schema.is_none());
        assert!(request.messages[1].content.contains("aucune donnée n'a été trouvée"));
    }
}
