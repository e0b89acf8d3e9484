use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime};
use regex::Regex;
use serde::Deserialize;
use tracing::info;

use crate::config::ProgramMarker;

use super::models::ScheduleEntry;
use super::store::ScheduleStore;
use super::IngestError;

/// One event of the timetable calendar export.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub description: String,
    pub start: String,
    pub end: String,
    #[serde(rename = "eventCategory", default)]
    pub event_category: Option<String>,
    #[serde(default)]
    pub sites: Option<Vec<String>>,
    #[serde(default)]
    pub modules: Option<Vec<String>>,
}

fn line_break() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<br\s*/?>|\n|\r").expect("static regex"))
}

fn course_name() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"-\s*(.*?)\s*\[").expect("static regex"))
}

fn space_before_punctuation() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+([.?!])").expect("static regex"))
}

fn parse_start(index: usize, value: &str) -> Result<NaiveDateTime, IngestError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.naive_utc())
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map_err(|_| IngestError::InvalidDate {
            index,
            value: value.to_string(),
        })
}

pub fn clean_event(
    index: usize,
    event: &RawEvent,
    programs: &[ProgramMarker],
) -> Result<ScheduleEntry, IngestError> {
    let description = html_escape::decode_html_entities(&event.description);
    let lines: Vec<&str> = line_break()
        .split(&description)
        .filter(|line| !line.trim().is_empty())
        .collect();
    let room_line = lines
        .get(1)
        .ok_or(IngestError::MissingLine { index, line: 2 })?;
    let course_line = lines
        .get(2)
        .ok_or(IngestError::MissingLine { index, line: 3 })?;

    let course = course_name()
        .captures(course_line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let room_raw = room_line.split('-').next().unwrap_or_default();
    let room = space_before_punctuation()
        .replace_all(room_raw, "$1")
        .trim()
        .to_string();

    let mut labels: Vec<&str> = Vec::new();
    for line in &lines {
        for program in programs {
            if line.contains(program.marker.as_str()) && !labels.contains(&program.label.as_str()) {
                labels.push(program.label.as_str());
            }
        }
    }

    Ok(ScheduleEntry {
        id: index as i64,
        kind: event.event_category.clone().unwrap_or_default(),
        start: event.start.clone(),
        end: event.end.clone(),
        course,
        room,
        building: event.sites.as_deref().unwrap_or_default().join(", "),
        program: labels.join("; "),
        module: event.modules.as_deref().unwrap_or_default().join(", "),
    })
}

/// Cleans a whole export. Ids follow input order; entries come back sorted by start.
pub fn parse_export(json: &str, programs: &[ProgramMarker]) -> Result<Vec<ScheduleEntry>, IngestError> {
    let events: Vec<RawEvent> = serde_json::from_str(json)?;
    let mut keyed = Vec::with_capacity(events.len());
    for (index, event) in events.iter().enumerate() {
        let start = parse_start(index, &event.start)?;
        keyed.push((start, clean_event(index, event, programs)?));
    }
    keyed.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.id.cmp(&b.1.id)));
    Ok(keyed.into_iter().map(|(_, entry)| entry).collect())
}

pub fn ingest_file(
    store: &ScheduleStore,
    path: impl AsRef<Path>,
    programs: &[ProgramMarker],
) -> Result<usize, IngestError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let entries = parse_export(&content, programs)?;
    store.initialize()?;
    let inserted = store.insert_entries(&entries)?;
    info!(
        target: "ingest",
        inserted,
        source = %path.as_ref().display(),
        "emploi du temps importé"
    );
    Ok(inserted)
}
