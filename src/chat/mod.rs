//! Conversation about the ingested document.

pub mod service;
pub mod suggestions;
pub mod types;

pub use service::ChatOrchestrator;
pub use suggestions::{SuggestionReceiver, SuggestionSender, suggested_questions, suggestion_channel};
pub use types::{ChatError, ChatState, Message, Role, SendOutcome, SkipReason};
