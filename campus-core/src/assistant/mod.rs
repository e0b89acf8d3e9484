pub mod dispatch;
pub mod error;
pub mod session;

pub use dispatch::{AgentKind, Assistant, AssistantReply};
pub use error::{AssistantError, AssistantResult};
pub use session::{Exchange, Session, SessionRegistry, SharedSession};
