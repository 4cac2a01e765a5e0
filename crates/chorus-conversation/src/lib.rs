pub mod config;
pub mod extract;
pub mod store;
pub mod types;
pub mod validity;

pub use config::{ChannelChatbotConfig, ChatbotConfigStore};
pub use extract::{extract_context, Extracted};
pub use store::ConversationStore;
pub use types::ConversationMessage;
pub use validity::{is_valid_context_message, is_valid_context_message_traced, TraceStep};
