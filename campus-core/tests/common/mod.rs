#![allow(dead_code)]

use campus_core::{ScheduleEntry, ScheduleStore};
use tempfile::TempDir;

pub use campus_core::ScriptedModel;

pub fn relevance(label: &str) -> String {
    serde_json::json!({ "relevance": label }).to_string()
}

pub fn sql(statement: &str) -> String {
    serde_json::json!({ "sql_query": statement }).to_string()
}

pub fn rewritten(question: &str) -> String {
    serde_json::json!({ "question": question }).to_string()
}

pub fn entry(id: i64, start: &str, course: &str, room: &str) -> ScheduleEntry {
    ScheduleEntry {
        id,
        kind: "CM".into(),
        start: start.into(),
        end: start.replace("T09", "T12").replace("T14", "T17"),
        course: course.into(),
        room: room.into(),
        building: "Fermat".into(),
        program: "M2 Saclay Mathématiques et Apprentissage Statistique Math&AS".into(),
        module: "MAS01".into(),
    }
}

/// Store seeded with three sessions; keep the `TempDir` alive for the test.
pub fn seeded_store() -> (TempDir, ScheduleStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ScheduleStore::builder()
        .path(dir.path().join("edt.sqlite"))
        .create_if_missing(true)
        .build()
        .unwrap();
    store.initialize().unwrap();
    store
        .insert_entries(&[
            entry(0, "2025-03-10T09:00:00", "Statistique non paramétrique", "G 204"),
            entry(1, "2025-03-11T14:00:00", "Apprentissage profond", "A 101"),
            entry(2, "2025-03-12T09:00:00", "Statistique non paramétrique", "G 204"),
        ])
        .unwrap();
    (dir, store)
}
