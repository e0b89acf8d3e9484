use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};
use serde_json::Value;
use tracing::{debug, warn};

use crate::sqlite::{configure_connection, configure_writer};

use super::models::{ExecutionOutcome, ResultRow, ScheduleEntry, SqlPolicy};
use super::{StoreError, StoreResult};

const SCHEDULE_SCHEMA: &str = include_str!("../../../sql/schedule.sql");

pub const NO_RESULTS: &str = "No results found.";
pub const ACTION_COMPLETED: &str = "The action has been successfully completed.";

#[derive(Debug, Clone)]
pub struct ScheduleStoreBuilder {
    path: Option<PathBuf>,
    create_if_missing: bool,
}

impl Default for ScheduleStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
        }
    }
}

impl ScheduleStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> StoreResult<ScheduleStore> {
        let path = self.path.ok_or(StoreError::MissingStore)?;
        Ok(ScheduleStore {
            path,
            create_if_missing: self.create_if_missing,
        })
    }
}

/// Timetable database. Every call opens its own connection, which is closed
/// (and any open transaction rolled back) when the call returns.
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    path: PathBuf,
    create_if_missing: bool,
}

impl ScheduleStore {
    pub fn builder() -> ScheduleStoreBuilder {
        ScheduleStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        ScheduleStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self, write: bool) -> StoreResult<Connection> {
        let flags = if write {
            let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE;
            if self.create_if_missing {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
            flags
        } else {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        };
        let conn = Connection::open_with_flags(&self.path, flags).map_err(|source| {
            StoreError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        let configured = if write {
            configure_writer(&conn)
        } else {
            configure_connection(&conn)
        };
        configured.map_err(|source| StoreError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> StoreResult<()> {
        let conn = self.open(true)?;
        conn.execute_batch(SCHEDULE_SCHEMA)?;
        Ok(())
    }

    pub fn insert_entries(&self, entries: &[ScheduleEntry]) -> StoreResult<usize> {
        let mut conn = self.open(true)?;
        let tx = conn.transaction()?;
        for entry in entries {
            tx.execute(
                "INSERT OR REPLACE INTO edt (id, type, start, \"end\", course, room, building, program, module)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    entry.id,
                    &entry.kind,
                    &entry.start,
                    &entry.end,
                    &entry.course,
                    &entry.room,
                    &entry.building,
                    &entry.program,
                    &entry.module,
                ],
            )?;
        }
        tx.commit()?;
        Ok(entries.len())
    }

    pub fn count(&self) -> StoreResult<usize> {
        let conn = self.open(false)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM edt", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn list(&self, limit: usize) -> StoreResult<Vec<ScheduleEntry>> {
        let conn = self.open(false)?;
        let mut stmt = conn.prepare("SELECT * FROM edt ORDER BY start ASC, id ASC LIMIT ?1")?;
        let rows = stmt
            .query_map([limit as i64], |row| ScheduleEntry::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Runs a synthesized statement. Never fails: faults become
    /// [`ExecutionOutcome::Failed`] carrying the error description.
    pub fn execute(&self, sql: &str, policy: SqlPolicy) -> ExecutionOutcome {
        let statement = sql
            .trim()
            .trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        if has_trailing_statement(statement) {
            warn!(target: "planner.sql", "requête refusée: plusieurs instructions");
            return ExecutionOutcome::Failed {
                message: "Error executing SQL query: only one statement allowed".to_string(),
            };
        }
        let keyword = leading_keyword(statement);
        let outcome = if keyword == "select" {
            self.run_select(statement)
        } else if policy == SqlPolicy::ReadOnly {
            warn!(target: "planner.sql", keyword = %keyword, "requête refusée: seules les requêtes SELECT sont autorisées");
            return ExecutionOutcome::Failed {
                message: format!(
                    "Error executing SQL query: statement rejected, only SELECT queries are allowed (got `{}`)",
                    if keyword.is_empty() { "<empty>" } else { keyword.as_str() }
                ),
            };
        } else {
            self.run_mutation(statement)
        };
        outcome.unwrap_or_else(|err| {
            debug!(target: "planner.sql", "échec d'exécution: {err}");
            ExecutionOutcome::Failed {
                message: format!("Error executing SQL query: {}", describe(&err)),
            }
        })
    }

    fn run_select(&self, statement: &str) -> StoreResult<ExecutionOutcome> {
        let conn = self.open(false)?;
        let mut stmt = conn.prepare(statement)?;
        let columns = unique_columns(stmt.column_names());
        let mut rows = Vec::new();
        let mut cursor = stmt.query([])?;
        while let Some(row) = cursor.next()? {
            let mut record = ResultRow::with_capacity(columns.len());
            for (idx, column) in columns.iter().enumerate() {
                record.insert(column.clone(), to_json(row.get_ref(idx)?));
            }
            rows.push(record);
        }
        let summary = format_rows(&columns, &rows);
        Ok(ExecutionOutcome::Rows { rows, summary })
    }

    fn run_mutation(&self, statement: &str) -> StoreResult<ExecutionOutcome> {
        let mut conn = self.open(true)?;
        let tx = conn.transaction()?;
        tx.execute_batch(statement)?;
        tx.commit()?;
        Ok(ExecutionOutcome::Applied {
            summary: ACTION_COMPLETED.to_string(),
        })
    }
}

/// Whether a statement is a query, ignoring case and opening parentheses.
pub fn is_select(statement: &str) -> bool {
    leading_keyword(statement) == "select"
}

fn leading_keyword(statement: &str) -> String {
    statement
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// True when anything other than whitespace or comments follows a `;` that
/// sits outside quoted text.
fn has_trailing_statement(sql: &str) -> bool {
    let mut chars = sql.chars().peekable();
    let mut ended = false;
    while let Some(c) = chars.next() {
        match c {
            '\'' | '"' | '`' | '[' => {
                if ended {
                    return true;
                }
                let close = if c == '[' { ']' } else { c };
                while let Some(inner) = chars.next() {
                    if inner == close {
                        if close != ']' && chars.peek() == Some(&close) {
                            chars.next();
                            continue;
                        }
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut star = false;
                for inner in chars.by_ref() {
                    if star && inner == '/' {
                        break;
                    }
                    star = inner == '*';
                }
            }
            ';' => ended = true,
            c if c.is_whitespace() => {}
            _ if ended => return true,
            _ => {}
        }
    }
    false
}

/// Column labels made unique so every value keeps its own key: `course`, `course_2`.
fn unique_columns(names: Vec<&str>) -> Vec<String> {
    let mut columns: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let mut candidate = name.to_string();
        let mut suffix = 2;
        while columns.contains(&candidate) {
            candidate = format!("{name}_{suffix}");
            suffix += 1;
        }
        columns.push(candidate);
    }
    columns
}

fn describe(err: &StoreError) -> String {
    match err {
        StoreError::Database(source) | StoreError::OpenDatabase { source, .. } => source.to_string(),
        other => other.to_string(),
    }
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::from(number),
        ValueRef::Real(number) => serde_json::Number::from_f64(number)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn format_rows(columns: &[String], rows: &[ResultRow]) -> String {
    if rows.is_empty() {
        return NO_RESULTS.to_string();
    }
    let header = columns.join(", ");
    let data = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|(column, value)| format!("{column}: {}", render_value(value)))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect::<Vec<_>>()
        .join("\n");
    format!("{header}\n{data}")
}
