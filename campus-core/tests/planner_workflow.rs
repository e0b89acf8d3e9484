mod common;

use std::sync::Arc;

use campus_core::{
    PlannerConfig, PlannerWorkflow, Relevance, SchemaDescription, ScheduleStore, SqlPolicy,
    Stage, Terminal,
};
use chrono::NaiveDate;
use common::{relevance, rewritten, seeded_store, sql, ScriptedModel};

fn workflow(model: Arc<ScriptedModel>, store: ScheduleStore) -> PlannerWorkflow {
    PlannerWorkflow::new(
        model,
        store,
        SchemaDescription::timetable(),
        PlannerConfig::default(),
    )
    .with_reference_date(NaiveDate::from_ymd_opt(2025, 3, 10).unwrap())
}

#[tokio::test]
async fn off_topic_question_never_reaches_sql() {
    let (_dir, store) = seeded_store();
    let model = ScriptedModel::shared([
        relevance("not_relevant"),
        "Le bleu, évidemment, comme les amphis un lundi matin.".to_string(),
    ]);
    let run = workflow(model.clone(), store)
        .run("Quelle est ta couleur préférée ?")
        .await
        .unwrap();

    assert_eq!(run.terminal, Terminal::OffTopic);
    assert_eq!(run.state.relevance, Relevance::NotRelevant);
    assert_eq!(run.trace, vec![Stage::CheckRelevance, Stage::GenerateFunnyResponse]);
    assert!(run.state.sql_query.is_empty());
    assert_eq!(model.labels(), vec!["check_relevance", "text"]);
    assert!(run.state.result_text.starts_with("Le bleu"));
}

#[tokio::test]
async fn single_row_answer() {
    let (_dir, store) = seeded_store();
    let model = ScriptedModel::shared([
        relevance("relevant"),
        sql("SELECT course, room, building, start FROM edt WHERE start LIKE '2025-03-11%'"),
        "Demain vous avez Apprentissage profond en salle A 101 (Fermat) à 14h.".to_string(),
    ]);
    let run = workflow(model.clone(), store)
        .run("Quel cours ai-je demain ?")
        .await
        .unwrap();

    assert_eq!(run.terminal, Terminal::Answered);
    assert_eq!(run.state.attempts, 0);
    assert!(!run.state.sql_error);
    assert_eq!(run.state.result_rows.len(), 1);
    assert_eq!(run.state.result_rows[0]["room"], "A 101");
    assert!(run.state.result_text.contains("A 101"));
    assert_eq!(model.labels(), vec!["check_relevance", "convert_to_sql", "text"]);

    let answer_prompt = &model.requests()[2].messages[1].content;
    assert!(answer_prompt.contains("course: Apprentissage profond, room: A 101"));
}

#[tokio::test]
async fn three_failures_give_up() {
    let (_dir, store) = seeded_store();
    let model = ScriptedModel::shared([
        relevance("relevant"),
        sql("SELEC course FROM edt"),
        rewritten("Quels cours sont prévus le 2025-03-11 ?"),
        sql("SELECT course FROM emploi"),
        rewritten("Quels cours figurent dans la table edt le 2025-03-11 ?"),
        sql("SELECT salle FROM edt"),
    ]);
    let run = workflow(model.clone(), store)
        .run("Quels cours demain ?")
        .await
        .unwrap();

    assert_eq!(run.terminal, Terminal::GaveUp);
    assert_eq!(run.state.result_text, "Veuillez réessayer");
    assert_eq!(run.state.attempts, 3);
    assert!(run.state.sql_error);
    assert!(run.state.result_rows.is_empty());
    assert_eq!(run.visited(Stage::ConvertToSql), 3);
    assert_eq!(run.visited(Stage::RegenerateQuery), 3);
    assert_eq!(run.trace.last(), Some(&Stage::GiveUp));
    assert_eq!(model.remaining(), 0);
    assert_eq!(
        model.labels(),
        vec![
            "check_relevance",
            "convert_to_sql",
            "rewritten_question",
            "convert_to_sql",
            "rewritten_question",
            "convert_to_sql",
        ]
    );
}

#[tokio::test]
async fn third_attempt_succeeds() {
    let (_dir, store) = seeded_store();
    let model = ScriptedModel::shared([
        relevance("relevant"),
        sql("SELECT nope FROM edt"),
        rewritten("Dans quelle salle a lieu Statistique non paramétrique ?"),
        sql("SELECT room FROM nowhere"),
        rewritten("Quelle salle et quel bâtiment pour le cours Statistique non paramétrique ?"),
        sql("SELECT DISTINCT room, building FROM edt WHERE course = 'Statistique non paramétrique'"),
        "Le cours a lieu en salle G 204, bâtiment Fermat.".to_string(),
    ]);
    let run = workflow(model.clone(), store)
        .run("Où a lieu le cours de stat ?")
        .await
        .unwrap();

    assert_eq!(run.terminal, Terminal::Answered);
    assert_eq!(run.state.attempts, 2);
    assert!(!run.state.sql_error);
    assert_eq!(run.state.result_rows.len(), 1);
    assert_eq!(
        run.state.question,
        "Quelle salle et quel bâtiment pour le cours Statistique non paramétrique ?"
    );
    assert_eq!(run.trace.last(), Some(&Stage::GenerateAnswer));
}

#[tokio::test]
async fn attempts_grow_by_one_per_regeneration() {
    let (_dir, store) = seeded_store();
    let model = ScriptedModel::shared([
        relevance("relevant"),
        sql("DROP TABLE edt"),
        rewritten("Combien de cours au total ?"),
        sql("SELECT COUNT(*) AS total FROM edt"),
        "Il y a 3 cours.".to_string(),
    ]);
    let run = workflow(model, store.clone()).run("Combien ?").await.unwrap();

    assert_eq!(run.state.attempts, 1);
    assert_eq!(run.visited(Stage::RegenerateQuery), 1);
    assert_eq!(run.state.result_rows[0]["total"], 3);
    // The read-only policy rejected the DROP before it touched the table.
    assert_eq!(store.count().unwrap(), 3);
}

#[tokio::test]
async fn stacked_statement_is_regenerated() {
    let (_dir, store) = seeded_store();
    let model = ScriptedModel::shared([
        relevance("relevant"),
        sql("SELECT course FROM edt WHERE id = 1; DELETE FROM edt"),
        rewritten("Quel est le cours numéro 1 ?"),
        sql("SELECT course FROM edt WHERE id = 1"),
        "Apprentissage profond.".to_string(),
    ]);
    let run = workflow(model, store.clone()).run("Cours 1 ?").await.unwrap();

    assert_eq!(run.terminal, Terminal::Answered);
    assert_eq!(run.state.attempts, 1);
    assert_eq!(run.state.result_rows[0]["course"], "Apprentissage profond");
    assert_eq!(store.count().unwrap(), 3);
}

#[tokio::test]
async fn empty_result_is_not_an_error() {
    let (_dir, store) = seeded_store();
    let model = ScriptedModel::shared([
        relevance("relevant"),
        sql("SELECT * FROM edt WHERE start LIKE '2025-03-16%'"),
        "Aucun cours n'est prévu dimanche.".to_string(),
    ]);
    let run = workflow(model.clone(), store)
        .run("J'ai cours dimanche ?")
        .await
        .unwrap();

    assert!(!run.state.sql_error);
    assert!(run.state.result_rows.is_empty());
    assert_eq!(run.terminal, Terminal::Answered);
    let answer_prompt = &model.requests()[2].messages[1].content;
    assert!(answer_prompt.contains("No results found."));
    assert!(answer_prompt.contains("aucune donnée n'a été trouvée"));
}

#[tokio::test]
async fn mutations_run_when_allowed() {
    let (_dir, store) = seeded_store();
    let model = ScriptedModel::shared([
        relevance("relevant"),
        sql("UPDATE edt SET room = 'B 002' WHERE id = 1"),
        "C'est fait, la salle a été mise à jour.".to_string(),
    ]);
    let config = PlannerConfig {
        policy: SqlPolicy::AllowMutations,
        ..PlannerConfig::default()
    };
    let planner = PlannerWorkflow::new(
        model.clone(),
        store.clone(),
        SchemaDescription::timetable(),
        config,
    );
    let run = planner.run("Déplace le cours 1 en B 002").await.unwrap();

    assert_eq!(run.terminal, Terminal::Answered);
    assert!(!run.state.sql_error);
    let answer_prompt = &model.requests()[2].messages[1].content;
    assert!(answer_prompt.contains("confirmer que la demande"));
    let rooms: Vec<String> = store.list(10).unwrap().into_iter().map(|e| e.room).collect();
    assert!(rooms.contains(&"B 002".to_string()));
}

#[tokio::test]
async fn run_planner_returns_final_text() {
    let (_dir, store) = seeded_store();
    let model = ScriptedModel::shared([
        relevance("relevant"),
        sql("SELECT course FROM edt WHERE id = 0"),
        "  Statistique non paramétrique.  ".to_string(),
    ]);
    let text = workflow(model, store).run_planner("Premier cours ?").await.unwrap();
    assert_eq!(text, "Statistique non paramétrique.");
}

#[tokio::test]
async fn model_failure_aborts_the_run() {
    let (_dir, store) = seeded_store();
    let model = ScriptedModel::shared([relevance("relevant")]);
    let err = workflow(model, store).run("Cours lundi ?").await.unwrap_err();
    assert!(err.to_string().contains("language model error"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_runs_are_isolated() {
    let (_dir, store) = seeded_store();
    let mut handles = Vec::new();
    for (id, course) in [(0, "Statistique non paramétrique"), (1, "Apprentissage profond")] {
        let model = ScriptedModel::shared([
            relevance("relevant"),
            sql(&format!("SELECT course FROM edt WHERE id = {id}")),
            course.to_string(),
        ]);
        let planner = workflow(model, store.clone());
        handles.push(tokio::spawn(async move {
            planner.run(&format!("Cours numéro {id} ?")).await
        }));
    }
    let runs = futures::future::join_all(handles).await;
    let first = runs[0].as_ref().unwrap().as_ref().unwrap();
    let second = runs[1].as_ref().unwrap().as_ref().unwrap();
    assert_eq!(first.state.result_rows[0]["course"], "Statistique non paramétrique");
    assert_eq!(second.state.result_rows[0]["course"], "Apprentissage profond");
    assert_eq!(first.state.attempts, 0);
    assert_eq!(second.state.attempts, 0);
}
