use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::PlannerSection;
use crate::schedule::{ResultRow, SqlPolicy};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Relevance {
    Relevant,
    NotRelevant,
    #[default]
    Unset,
}

impl Relevance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relevance::Relevant => "relevant",
            Relevance::NotRelevant => "not_relevant",
            Relevance::Unset => "unset",
        }
    }

    /// Anything other than `relevant` (case-insensitive) counts as off topic.
    pub fn from_label(label: &str) -> Self {
        let cleaned = label.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        if cleaned.eq_ignore_ascii_case("relevant") {
            Relevance::Relevant
        } else {
            Relevance::NotRelevant
        }
    }
}

impl fmt::Display for Relevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record threaded through one workflow run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkflowState {
    pub question: String,
    pub sql_query: String,
    pub result_rows: Vec<ResultRow>,
    pub result_text: String,
    pub relevance: Relevance,
    pub sql_error: bool,
    pub attempts: u32,
}

impl WorkflowState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            sql_query: String::new(),
            result_rows: Vec::new(),
            result_text: String::new(),
            relevance: Relevance::Unset,
            sql_error: false,
            attempts: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    CheckRelevance,
    ConvertToSql,
    ExecuteSql,
    RegenerateQuery,
    GenerateAnswer,
    GenerateFunnyResponse,
    GiveUp,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CheckRelevance => "check_relevance",
            Stage::ConvertToSql => "convert_to_sql",
            Stage::ExecuteSql => "execute_sql",
            Stage::RegenerateQuery => "regenerate_query",
            Stage::GenerateAnswer => "generate_answer",
            Stage::GenerateFunnyResponse => "generate_funny_response",
            Stage::GiveUp => "give_up",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    Answered,
    OffTopic,
    GaveUp,
}

impl fmt::Display for Terminal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Terminal::Answered => "answered",
            Terminal::OffTopic => "off_topic",
            Terminal::GaveUp => "gave_up",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlannerRun {
    pub state: WorkflowState,
    pub terminal: Terminal,
    pub trace: Vec<Stage>,
}

impl PlannerRun {
    pub fn visited(&self, stage: Stage) -> usize {
        self.trace.iter().filter(|visited| **visited == stage).count()
    }
}

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    pub max_attempts: u32,
    pub give_up_message: String,
    pub policy: SqlPolicy,
    /// Fixed "today" for date resolution; the local date when unset.
    pub reference_date: Option<NaiveDate>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            give_up_message: "Veuillez réessayer".to_string(),
            policy: SqlPolicy::ReadOnly,
            reference_date: None,
        }
    }
}

impl From<&PlannerSection> for PlannerConfig {
    fn from(section: &PlannerSection) -> Self {
        Self {
            max_attempts: section.max_attempts.max(1),
            give_up_message: section.give_up_message.clone(),
            policy: SqlPolicy::from_flag(section.allow_mutations),
            reference_date: None,
        }
    }
}
