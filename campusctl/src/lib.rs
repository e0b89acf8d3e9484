use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use campus_core::schedule::ingest::ingest_file;
use campus_core::{
    load_assistant_config, model_from_config, Assistant, AssistantConfig, LanguageModel,
    PlannerConfig, PlannerRun, PlannerWorkflow, ScheduleEntry, ScheduleStore, SchemaDescription,
    Session, SessionRegistry, Stage, Terminal,
};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] campus_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("schedule store error: {0}")]
    Store(#[from] campus_core::StoreError),
    #[error("ingestion error: {0}")]
    Ingest(#[from] campus_core::IngestError),
    #[error("language model error: {0}")]
    Llm(#[from] campus_core::LlmError),
    #[error("planner error: {0}")]
    Planner(#[from] campus_core::PlannerError),
    #[error("assistant error: {0}")]
    Assistant(#[from] campus_core::AssistantError),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Assistant universitaire en ligne de commande", long_about = None)]
pub struct Cli {
    /// Chemin du fichier assistant.toml
    #[arg(long, default_value = "configs/assistant.toml")]
    pub config: PathBuf,
    /// Répertoire de données (remplace paths.data_dir)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Chemin alternatif de la base emploi du temps
    #[arg(long)]
    pub schedule_db: Option<PathBuf>,
    /// Format de sortie
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Journalisation détaillée (niveau debug)
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pose une question, routée vers l'agent adapté
    Ask(QuestionArgs),
    /// Session de discussion interactive (/quit pour sortir)
    Chat,
    /// Interroge directement l'emploi du temps via le planificateur SQL
    Plan(PlanArgs),
    /// Opérations sur la base emploi du temps
    #[command(subcommand)]
    Schedule(ScheduleCommands),
    /// Vérifications d'intégrité
    #[command(subcommand)]
    Health(HealthCommands),
    /// Génère les complétions shell
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct QuestionArgs {
    /// Question en langage naturel
    pub question: String,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Question en langage naturel
    pub question: String,
    /// Remplace planner.max_attempts
    #[arg(long)]
    pub max_attempts: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum ScheduleCommands {
    /// Crée la table si nécessaire
    Init,
    /// Importe un export JSON du calendrier
    Ingest(IngestArgs),
    /// Liste les cours enregistrés
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Fichier JSON exporté du calendrier
    pub path: PathBuf,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Nombre maximal de cours affichés
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Subcommand, Debug)]
pub enum HealthCommands {
    /// Exécute les vérifications de base
    Check,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    pub shell: clap_complete::Shell,
}

pub async fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(args.shell, &mut command, "campusctl", &mut std::io::stdout());
        return Ok(());
    }

    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Ask(args) => {
            let report = context.ask(&args.question).await?;
            render(&report, cli.format)?;
        }
        Commands::Chat => {
            let assistant = context.assistant()?;
            let registry = SessionRegistry::new();
            let stdin = BufReader::new(tokio::io::stdin());
            let mut stdout = std::io::stdout();
            chat_loop(&assistant, &registry, stdin, &mut stdout).await?;
        }
        Commands::Plan(args) => {
            let report = context.plan(&args.question, args.max_attempts).await?;
            render(&report, cli.format)?;
        }
        Commands::Schedule(ScheduleCommands::Init) => {
            let report = context.schedule_init()?;
            render(&report, cli.format)?;
        }
        Commands::Schedule(ScheduleCommands::Ingest(args)) => {
            let report = context.schedule_ingest(&args.path)?;
            render(&report, cli.format)?;
        }
        Commands::Schedule(ScheduleCommands::List(args)) => {
            let list = context.schedule_list(args.limit)?;
            render(&list, cli.format)?;
        }
        Commands::Health(HealthCommands::Check) => {
            let report = context.health_check();
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "une ou plusieurs vérifications ont échoué".to_string(),
                ));
            }
        }
        Commands::Completions(_) => {}
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

/// Reads questions line by line until `/quit` or end of input, then closes the session.
pub async fn chat_loop<R, W>(
    assistant: &Assistant,
    registry: &SessionRegistry,
    input: R,
    output: &mut W,
) -> Result<Session>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let (id, shared) = registry.open().await;
    let mut lines = input.lines();
    write!(output, "> ")?;
    output.flush()?;
    while let Some(line) = lines.next_line().await? {
        let question = line.trim();
        if question == "/quit" {
            break;
        }
        if !question.is_empty() {
            let mut session = shared.lock().await;
            match assistant.handle(&mut session, question).await {
                Ok(reply) => writeln!(output, "[{}] {}", reply.agent, reply.text)?,
                Err(err) => {
                    warn!(target: "assistant", session = %id, "échec du tour: {err}");
                    writeln!(output, "erreur : {err}")?;
                }
            }
        }
        write!(output, "> ")?;
        output.flush()?;
    }
    writeln!(output)?;
    registry
        .close(&id)
        .await
        .ok_or_else(|| AppError::MissingResource(format!("session {id}")))
}

struct AppContext {
    config: AssistantConfig,
    config_path: PathBuf,
    schedule_db: PathBuf,
    model: Option<Arc<dyn LanguageModel>>,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone();
        let mut config = load_assistant_config(&config_path)?;

        if let Some(data_dir) = &cli.data_dir {
            config.paths.data_dir = data_dir.to_string_lossy().into_owned();
        }
        let schedule_db = match (&cli.schedule_db, &cli.data_dir) {
            (Some(path), _) => path.clone(),
            (None, Some(data_dir)) => data_dir.join("edt.sqlite"),
            (None, None) => config.schedule_db_path(),
        };
        config.paths.schedule_db = schedule_db.to_string_lossy().into_owned();
        info!(
            target: "campusctl",
            name = %config.system.name,
            environment = %config.system.environment,
            university = %config.system.university,
            "configuration chargée"
        );

        Ok(Self {
            config,
            config_path,
            schedule_db,
            model: None,
        })
    }

    #[cfg(test)]
    fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    fn language_model(&self) -> Result<Arc<dyn LanguageModel>> {
        match &self.model {
            Some(model) => Ok(model.clone()),
            None => Ok(model_from_config(&self.config.llm)?),
        }
    }

    fn store(&self) -> Result<ScheduleStore> {
        Ok(ScheduleStore::new(&self.schedule_db)?)
    }

    fn assistant(&self) -> Result<Assistant> {
        Ok(Assistant::from_config(&self.config, self.language_model()?)?)
    }

    async fn ask(&self, question: &str) -> Result<AskReport> {
        let assistant = self.assistant()?;
        let mut session = Session::new();
        let reply = assistant.handle(&mut session, question).await?;
        Ok(AskReport {
            question: question.to_string(),
            agent: reply.agent.to_string(),
            intent: reply.intent.to_string(),
            answer: reply.text,
        })
    }

    async fn plan(&self, question: &str, max_attempts: Option<u32>) -> Result<PlanReport> {
        let mut config = PlannerConfig::from(&self.config.planner);
        if let Some(limit) = max_attempts {
            config.max_attempts = limit.max(1);
        }
        let planner = PlannerWorkflow::new(
            self.language_model()?,
            self.store()?,
            SchemaDescription::from(&self.config.schema),
            config,
        );
        let run = planner.run(question).await?;
        Ok(PlanReport::from_run(question, run))
    }

    fn schedule_init(&self) -> Result<ScheduleReport> {
        if let Some(parent) = self.schedule_db.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let store = self.store()?;
        store.initialize()?;
        let rows = store.count()?;
        info!(target: "ingest", path = %self.schedule_db.display(), rows, "base initialisée");
        Ok(ScheduleReport {
            database: self.schedule_db.display().to_string(),
            rows,
            imported: None,
        })
    }

    fn schedule_ingest(&self, path: &Path) -> Result<ScheduleReport> {
        if !path.exists() {
            return Err(AppError::MissingResource(format!(
                "export introuvable : {}",
                path.display()
            )));
        }
        self.schedule_init()?;
        let store = self.store()?;
        let imported = ingest_file(&store, path, &self.config.ingest.programs)?;
        Ok(ScheduleReport {
            database: self.schedule_db.display().to_string(),
            rows: store.count()?,
            imported: Some(imported),
        })
    }

    fn schedule_list(&self, limit: usize) -> Result<ScheduleList> {
        if !self.schedule_db.exists() {
            return Err(AppError::MissingResource(format!(
                "base emploi du temps absente : {}",
                self.schedule_db.display()
            )));
        }
        let rows = self.store()?.list(limit)?;
        Ok(ScheduleList { rows })
    }

    fn health_check(&self) -> Vec<HealthEntry> {
        let mut results = Vec::new();
        results.push(self.check_path("assistant.toml", &self.config_path));
        results.push(self.check_api_key());
        results.push(self.check_database("edt.sqlite", &self.schedule_db));
        results
    }

    fn check_path(&self, name: &str, path: &Path) -> HealthEntry {
        if path.exists() {
            HealthEntry::ok(name, format!("{}", path.display()))
        } else {
            HealthEntry::error(name, format!("{path} absent", path = path.display()))
        }
    }

    fn check_api_key(&self) -> HealthEntry {
        let name = &self.config.llm.api_key_env;
        match std::env::var(name) {
            Ok(value) if !value.trim().is_empty() => {
                HealthEntry::ok("api_key", format!("{name} défini ({})", self.config.llm.model))
            }
            _ => HealthEntry::warn("api_key", format!("{name} non défini")),
        }
    }

    fn check_database(&self, name: &str, path: &Path) -> HealthEntry {
        if !path.exists() {
            return HealthEntry::warn(
                name,
                format!("{path} introuvable", path = path.display()),
            );
        }
        match Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
            Ok(conn) => {
                let pragma: rusqlite::Result<String> =
                    conn.query_row("PRAGMA integrity_check;", [], |row| row.get(0));
                match pragma {
                    Ok(result) if result.to_lowercase() == "ok" => {
                        let table = &self.config.schema.table;
                        let count: rusqlite::Result<i64> = conn.query_row(
                            &format!("SELECT COUNT(*) FROM \"{table}\""),
                            [],
                            |row| row.get(0),
                        );
                        match count {
                            Ok(rows) => HealthEntry::ok(name, format!("intégrité ok, {rows} cours")),
                            Err(err) => HealthEntry::warn(name, format!("table {table} : {err}")),
                        }
                    }
                    Ok(result) => HealthEntry::warn(name, format!("integrity_check: {result}")),
                    Err(err) => HealthEntry::warn(name, format!("erreur : {err}")),
                }
            }
            Err(err) => HealthEntry::error(name, format!("ouverture impossible : {err}")),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AskReport {
    pub question: String,
    pub agent: String,
    pub intent: String,
    pub answer: String,
}

impl DisplayFallback for AskReport {
    fn display(&self) -> String {
        format!("[{}] {}", self.agent, self.answer)
    }
}

#[derive(Debug, Serialize)]
pub struct PlanReport {
    pub question: String,
    pub answer: String,
    pub terminal: Terminal,
    pub attempts: u32,
    pub sql_error: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sql_query: String,
    pub rows: usize,
    pub trace: Vec<Stage>,
}

impl PlanReport {
    fn from_run(question: &str, run: PlannerRun) -> Self {
        Self {
            question: question.to_string(),
            answer: run.state.result_text,
            terminal: run.terminal,
            attempts: run.state.attempts,
            sql_error: run.state.sql_error,
            sql_query: run.state.sql_query,
            rows: run.state.result_rows.len(),
            trace: run.trace,
        }
    }
}

impl DisplayFallback for PlanReport {
    fn display(&self) -> String {
        let trace = self
            .trace
            .iter()
            .map(Stage::as_str)
            .collect::<Vec<_>>()
            .join(" -> ");
        let mut lines = vec![self.answer.clone()];
        lines.push(format!(
            "Issue : {} | tentatives : {} | lignes : {}",
            self.terminal, self.attempts, self.rows
        ));
        if !self.sql_query.is_empty() {
            lines.push(format!("SQL : {}", self.sql_query));
        }
        lines.push(format!("Étapes : {trace}"));
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ScheduleReport {
    pub database: String,
    pub rows: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imported: Option<usize>,
}

impl DisplayFallback for ScheduleReport {
    fn display(&self) -> String {
        match self.imported {
            Some(imported) => format!(
                "{imported} cours importés dans {} ({} au total)",
                self.database, self.rows
            ),
            None => format!("Base {} prête ({} cours)", self.database, self.rows),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ScheduleList {
    pub rows: Vec<ScheduleEntry>,
}

impl DisplayFallback for ScheduleList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "Aucun cours enregistré".to_string();
        }
        self.rows
            .iter()
            .map(|entry| {
                format!(
                    "#{id} {start} -> {end} | {kind} | {course} | {room} ({building})",
                    id = entry.id,
                    start = entry.start,
                    end = entry.end,
                    kind = entry.kind,
                    course = entry.course,
                    room = entry.room,
                    building = entry.building,
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(|entry| format!("[{}] {}: {}", entry.status, entry.name, entry.detail))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
