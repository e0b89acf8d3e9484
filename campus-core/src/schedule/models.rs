use std::fmt;

use indexmap::IndexMap;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One result row: column name to value, in select-list order.
pub type ResultRow = IndexMap<String, Value>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub start: String,
    pub end: String,
    pub course: String,
    pub room: String,
    pub building: String,
    pub program: String,
    pub module: String,
}

impl ScheduleEntry {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            kind: row.get::<_, Option<String>>("type")?.unwrap_or_default(),
            start: row.get::<_, Option<String>>("start")?.unwrap_or_default(),
            end: row.get::<_, Option<String>>("end")?.unwrap_or_default(),
            course: row.get::<_, Option<String>>("course")?.unwrap_or_default(),
            room: row.get::<_, Option<String>>("room")?.unwrap_or_default(),
            building: row.get::<_, Option<String>>("building")?.unwrap_or_default(),
            program: row.get::<_, Option<String>>("program")?.unwrap_or_default(),
            module: row.get::<_, Option<String>>("module")?.unwrap_or_default(),
        })
    }
}

/// Which statements the executor is allowed to run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqlPolicy {
    #[default]
    ReadOnly,
    AllowMutations,
}

impl SqlPolicy {
    pub fn from_flag(allow_mutations: bool) -> Self {
        if allow_mutations {
            SqlPolicy::AllowMutations
        } else {
            SqlPolicy::ReadOnly
        }
    }
}

/// Result of running one synthesized statement.
///
/// Execution faults are values here, not errors: the workflow routes them
/// to the question rewriter instead of failing the request.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    Rows { rows: Vec<ResultRow>, summary: String },
    Applied { summary: String },
    Failed { message: String },
}

impl ExecutionOutcome {
    pub fn is_error(&self) -> bool {
        matches!(self, ExecutionOutcome::Failed { .. })
    }

    pub fn summary(&self) -> &str {
        match self {
            ExecutionOutcome::Rows { summary, .. } | ExecutionOutcome::Applied { summary } => {
                summary
            }
            ExecutionOutcome::Failed { message } => message,
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.summary())
    }
}
