use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::dispatch::AgentKind;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
    pub agent: AgentKind,
    pub at: DateTime<Utc>,
}

/// Conversation history of one user.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Exchange>,
    pub selected_agent: Option<AgentKind>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            messages: Vec::new(),
            selected_agent: None,
        }
    }

    pub fn record(&mut self, question: &str, answer: &str, agent: AgentKind) {
        self.messages.push(Exchange {
            question: question.to_string(),
            answer: answer.to_string(),
            agent,
            at: Utc::now(),
        });
        self.selected_agent = Some(agent);
    }

    pub fn last(&self) -> Option<&Exchange> {
        self.messages.last()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedSession = Arc<Mutex<Session>>;

/// Live sessions keyed by id. Sessions exist from `open` until `close`.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<Uuid, SharedSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn open(&self) -> (Uuid, SharedSession) {
        let session = Session::new();
        let id = session.id;
        let shared = Arc::new(Mutex::new(session));
        self.sessions.lock().await.insert(id, shared.clone());
        info!(target: "assistant", session = %id, "session ouverte");
        (id, shared)
    }

    pub async fn get(&self, id: &Uuid) -> Option<SharedSession> {
        self.sessions.lock().await.get(id).cloned()
    }

    pub async fn close(&self, id: &Uuid) -> Option<Session> {
        let shared = self.sessions.lock().await.remove(id)?;
        let session = shared.lock().await.clone();
        info!(
            target: "assistant",
            session = %id,
            exchanges = session.messages.len(),
            "session fermée"
        );
        Some(session)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
