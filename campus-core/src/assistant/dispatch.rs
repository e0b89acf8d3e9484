use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::agents::{KnowledgeAgent, RetrievalAgent};
use crate::config::AssistantConfig;
use crate::llm::{complete_text, ChatMessage, LanguageModel};
use crate::planner::{PlannerConfig, PlannerWorkflow, SchemaDescription};
use crate::router::{Intent, IntentRouter};
use crate::schedule::ScheduleStore;

use super::{AssistantResult, Session};

const FALLBACK_SYSTEM: &str = "Tu es un assistant sympathique, plein d'esprit et avec une légère touche d'humour.\n\
Ton domaine d'expertise est centré sur l'Université de Versailles Saint-Quentin-en-Yvelines (UVSQ) : ses cours, ses emplois du temps, ses filières, ses services, sa vie étudiante, ou toute autre information utile aux étudiants.\n\
Tu es là pour aider, même quand l'utilisateur ne pose pas directement une question sur l'UVSQ.\n\
S'il te parle d'autre chose ou te pose une question hors sujet, réponds avec bienveillance, humour et légèreté, puis redirige subtilement la conversation en lui proposant ton aide sur des sujets liés à l'université.\n\
N'hésite pas à relancer avec des suggestions utiles : \"Tu veux que je t'aide à retrouver ton emploi du temps ?\", \"Besoin d'infos sur ta filière ?\", ou \"Je peux aussi te filer un coup de main pour comprendre le calendrier universitaire.\"";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AgentKind {
    AssistantTeacher,
    SmartPlanner,
    UniversityInfo,
    None,
}

impl AgentKind {
    pub fn for_intent(intent: Intent) -> Self {
        match intent {
            Intent::Course => AgentKind::AssistantTeacher,
            Intent::Schedule => AgentKind::SmartPlanner,
            Intent::UniversityInfo => AgentKind::UniversityInfo,
            Intent::Other => AgentKind::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::AssistantTeacher => "AssistantTeacher",
            AgentKind::SmartPlanner => "SmartPlanner",
            AgentKind::UniversityInfo => "UniversityInfo",
            AgentKind::None => "none",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AssistantReply {
    pub agent: AgentKind,
    pub intent: Intent,
    pub text: String,
}

/// Routes each question to the sub-agent matching its intent.
pub struct Assistant {
    router: IntentRouter,
    course: Arc<dyn KnowledgeAgent>,
    planner: PlannerWorkflow,
    university: Arc<dyn KnowledgeAgent>,
    model: Arc<dyn LanguageModel>,
}

impl Assistant {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        planner: PlannerWorkflow,
        course: Arc<dyn KnowledgeAgent>,
        university: Arc<dyn KnowledgeAgent>,
    ) -> Self {
        Self {
            router: IntentRouter::new(model.clone()),
            course,
            planner,
            university,
            model,
        }
    }

    pub fn from_config(
        config: &AssistantConfig,
        model: Arc<dyn LanguageModel>,
    ) -> AssistantResult<Self> {
        let store = ScheduleStore::new(config.schedule_db_path())?;
        let planner = PlannerWorkflow::new(
            model.clone(),
            store,
            SchemaDescription::from(&config.schema),
            PlannerConfig::from(&config.planner),
        );
        let course = Arc::new(RetrievalAgent::from_config(
            AgentKind::AssistantTeacher.as_str(),
            &config.agents.course,
            model.clone(),
        ));
        let university = Arc::new(RetrievalAgent::from_config(
            AgentKind::UniversityInfo.as_str(),
            &config.agents.university,
            model.clone(),
        ));
        Ok(Self::new(model, planner, course, university))
    }

    pub fn planner(&self) -> &PlannerWorkflow {
        &self.planner
    }

    pub async fn handle(
        &self,
        session: &mut Session,
        question: &str,
    ) -> AssistantResult<AssistantReply> {
        let intent = self.router.classify(question).await?;
        let agent = AgentKind::for_intent(intent);
        info!(target: "assistant", session = %session.id, %agent, "agent sélectionné");

        let text = match agent {
            AgentKind::AssistantTeacher => self.course.ask(question).await?,
            AgentKind::SmartPlanner => self.planner.run_planner(question).await?,
            AgentKind::UniversityInfo => self.university.ask(question).await?,
            AgentKind::None => {
                complete_text(
                    self.model.as_ref(),
                    vec![
                        ChatMessage::system(FALLBACK_SYSTEM),
                        ChatMessage::user(format!("Question originale: {question}")),
                    ],
                )
                .await?
            }
        };

        session.record(question, &text, agent);
        Ok(AssistantReply {
            agent,
            intent,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_map_to_agents() {
        assert_eq!(AgentKind::for_intent(Intent::Course), AgentKind::AssistantTeacher);
        assert_eq!(AgentKind::for_intent(Intent::Schedule), AgentKind::SmartPlanner);
        assert_eq!(AgentKind::for_intent(Intent::UniversityInfo), AgentKind::UniversityInfo);
        assert_eq!(AgentKind::for_intent(Intent::Other), AgentKind::None);
        assert_eq!(AgentKind::None.to_string(), "none");
    }
}
