//! API routes.

pub mod chat;
pub mod health;
pub mod providers;
pub mod sessions;
pub mod skills;
pub mod webhook;

pub use chat::{ChatApiRequest, ChatApiResponse, chat_handler, chat_stream_handler};
pub use health::health_handler;
pub use providers::{ProvidersResponse, providers_handler};
pub use sessions::{
    CreateSessionRequest, MessageInfo, SessionInfo, create_session_handler,
    delete_session_handler, get_session_handler, list_session_messages_handler,
    list_sessions_handler,
};
pub use skills::{
    SkillBody, create_skill_handler, delete_skill_handler, get_skill_handler,
    list_skills_handler, update_skill_handler,
};
pub use webhook::{WebhookResponse, webhook_handler};
