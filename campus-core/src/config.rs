use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AssistantConfig {
    pub system: SystemSection,
    pub paths: PathsSection,
    pub llm: LlmSection,
    #[serde(default)]
    pub planner: PlannerSection,
    pub schema: SchemaSection,
    pub agents: AgentsSection,
    #[serde(default)]
    pub ingest: IngestSection,
}

impl AssistantConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.base_dir).join(path)
        }
    }

    pub fn schedule_db_path(&self) -> PathBuf {
        self.resolve_path(&self.paths.schedule_db)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema.columns.is_empty() {
            return Err(ConfigError::Invalid(
                "schema.columns must describe at least one column".to_string(),
            ));
        }
        if self.schema.table.trim().is_empty() {
            return Err(ConfigError::Invalid("schema.table is empty".to_string()));
        }
        if self.planner.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "planner.max_attempts must be at least 1".to_string(),
            ));
        }
        url::Url::parse(&self.llm.endpoint).map_err(|err| {
            ConfigError::Invalid(format!("llm.endpoint {}: {err}", self.llm.endpoint))
        })?;
        for (name, agent) in [
            ("course", &self.agents.course),
            ("university", &self.agents.university),
        ] {
            url::Url::parse(&agent.endpoint).map_err(|err| {
                ConfigError::Invalid(format!("agents.{name}.endpoint {}: {err}", agent.endpoint))
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemSection {
    pub name: String,
    pub environment: String,
    pub university: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub base_dir: String,
    pub data_dir: String,
    pub schedule_db: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: f32,
    pub timeout_seconds: u64,
    #[serde(default)]
    pub breaker: BreakerSection,
}

impl LlmSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BreakerSection {
    pub window_size: usize,
    pub failure_threshold: f64,
    pub open_for_seconds: u64,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            window_size: 20,
            failure_threshold: 0.5,
            open_for_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlannerSection {
    pub max_attempts: u32,
    pub give_up_message: String,
    #[serde(default)]
    pub allow_mutations: bool,
}

impl Default for PlannerSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            give_up_message: "Veuillez réessayer".to_string(),
            allow_mutations: false,
        }
    }
}

/// Description of the timetable table handed to the SQL prompts.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SchemaSection {
    pub table: String,
    #[serde(default = "default_dialect")]
    pub dialect: String,
    pub columns: Vec<ColumnSection>,
}

fn default_dialect() -> String {
    "SQLite".to_string()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ColumnSection {
    pub name: String,
    pub description: String,
    /// Column holding several concatenated values; prompts ask for `LIKE '%x%'`.
    #[serde(default)]
    pub partial_match: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentsSection {
    pub course: AgentSection,
    pub university: AgentSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    pub endpoint: String,
    pub n_results: usize,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct IngestSection {
    #[serde(default)]
    pub programs: Vec<ProgramMarker>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProgramMarker {
    pub marker: String,
    pub label: String,
}

pub fn load_assistant_config<P: AsRef<Path>>(path: P) -> Result<AssistantConfig> {
    let config: AssistantConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
