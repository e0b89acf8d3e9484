mod common;

use std::sync::Arc;

use async_trait::async_trait;
use campus_core::{
    AgentKind, AgentResult, Assistant, Intent, KnowledgeAgent, PlannerConfig, PlannerWorkflow,
    SchemaDescription, SessionRegistry,
};
use common::{relevance, seeded_store, sql, ScriptedModel};

struct EchoAgent {
    name: &'static str,
}

#[async_trait]
impl KnowledgeAgent for EchoAgent {
    fn name(&self) -> &str {
        self.name
    }

    async fn ask(&self, query: &str) -> AgentResult<String> {
        Ok(format!("[{}] {query}", self.name))
    }
}

fn assistant(model: Arc<ScriptedModel>, store: campus_core::ScheduleStore) -> Assistant {
    let planner = PlannerWorkflow::new(
        model.clone(),
        store,
        SchemaDescription::timetable(),
        PlannerConfig::default(),
    );
    Assistant::new(
        model,
        planner,
        Arc::new(EchoAgent { name: "cours" }),
        Arc::new(EchoAgent { name: "uvsq" }),
    )
}

#[tokio::test]
async fn routes_each_intent_and_records_history() {
    let (_dir, store) = seeded_store();
    let model = ScriptedModel::shared([
        "cours".to_string(),
        "'UVSQ'".to_string(),
        "emploi_du_temps".to_string(),
        relevance("relevant"),
        sql("SELECT room FROM edt WHERE id = 0"),
        "Salle G 204.".to_string(),
        "je ne sais pas".to_string(),
        "Haha, je préfère parler de ton emploi du temps !".to_string(),
    ]);
    let assistant = assistant(model.clone(), store);
    let registry = SessionRegistry::new();
    let (id, shared) = registry.open().await;
    let mut session = shared.lock().await;

    let reply = assistant
        .handle(&mut session, "Qu'est-ce qu'un estimateur ?")
        .await
        .unwrap();
    assert_eq!(reply.agent, AgentKind::AssistantTeacher);
    assert_eq!(reply.text, "[cours] Qu'est-ce qu'un estimateur ?");

    let reply = assistant
        .handle(&mut session, "Comment s'inscrire à la BU ?")
        .await
        .unwrap();
    assert_eq!(reply.agent, AgentKind::UniversityInfo);

    let reply = assistant
        .handle(&mut session, "Dans quelle salle est mon premier cours ?")
        .await
        .unwrap();
    assert_eq!(reply.agent, AgentKind::SmartPlanner);
    assert_eq!(reply.intent, Intent::Schedule);
    assert_eq!(reply.text, "Salle G 204.");

    let reply = assistant.handle(&mut session, "Tu aimes le foot ?").await.unwrap();
    assert_eq!(reply.agent, AgentKind::None);
    assert_eq!(reply.intent, Intent::Other);
    assert!(reply.text.starts_with("Haha"));

    assert_eq!(session.messages.len(), 4);
    assert_eq!(session.selected_agent, Some(AgentKind::None));
    assert_eq!(session.messages[2].answer, "Salle G 204.");
    assert_eq!(model.remaining(), 0);

    let fallback = &model.requests()[7];
    assert_eq!(fallback.messages[1].content, "Question originale: Tu aimes le foot ?");

    drop(session);
    let closed = registry.close(&id).await.unwrap();
    assert_eq!(closed.messages.len(), 4);
}

#[tokio::test]
async fn failed_turn_is_not_recorded() {
    let (_dir, store) = seeded_store();
    let model = ScriptedModel::shared(["emploi_du_temps"]);
    let assistant = assistant(model, store);
    let mut session = campus_core::Session::new();
    let err = assistant.handle(&mut session, "Cours lundi ?").await.unwrap_err();
    assert!(err.to_string().contains("planner error"));
    assert!(session.messages.is_empty());
    assert!(session.selected_agent.is_none());
}
