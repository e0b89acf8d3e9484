use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::llm::{complete_text, ChatMessage, LanguageModel, LlmError};

const ROUTER_SYSTEM: &str = "Tu es un classificateur d'intention. Tu dois classer la question dans l'une de ces catégories :\n\
- 'cours' si elle concerne une notion académique comme une définition, démonstration, formule, etc.\n\
- 'emploi_du_temps' si elle concerne une organisation de planning, horaires, ou cours programmés\n\
- 'UVSQ' si elle concerne des informations sur l'Université de Versailles Saint-Quentin en Yvelines (UVSQ) qui peuvent être disponibles sur son site internet\n\
- 'autre' si elle ne concerne aucune des 3 thématiques précédentes.\n\
Réponds uniquement par 'cours' ou 'emploi_du_temps' ou 'UVSQ' ou 'autre'.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Course,
    Schedule,
    UniversityInfo,
    Other,
}

impl Intent {
    /// Label the classifier is asked to answer with.
    pub fn label(&self) -> &'static str {
        match self {
            Intent::Course => "cours",
            Intent::Schedule => "emploi_du_temps",
            Intent::UniversityInfo => "UVSQ",
            Intent::Other => "autre",
        }
    }

    /// Unknown labels fall back to [`Intent::Other`].
    pub fn from_label(label: &str) -> Self {
        let cleaned = label
            .trim()
            .trim_matches(|c: char| c == '\'' || c == '"' || c == '`' || c == '.')
            .trim()
            .to_lowercase();
        match cleaned.as_str() {
            "cours" | "course" => Intent::Course,
            "emploi_du_temps" | "schedule" => Intent::Schedule,
            "uvsq" | "university_info" => Intent::UniversityInfo,
            _ => Intent::Other,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Clone)]
pub struct IntentRouter {
    model: Arc<dyn LanguageModel>,
}

impl IntentRouter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    pub async fn classify(&self, question: &str) -> Result<Intent, LlmError> {
        let label = complete_text(
            self.model.as_ref(),
            vec![ChatMessage::system(ROUTER_SYSTEM), ChatMessage::user(question)],
        )
        .await?;
        let intent = Intent::from_label(&label);
        info!(target: "router", %intent, raw = %label, "intention détectée");
        Ok(intent)
    }
}
