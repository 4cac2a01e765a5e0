pub mod blocks;
pub mod format;
pub mod prioritize;
pub mod sanitize;
pub mod snippet;
pub mod types;

pub use blocks::{channel_context_block, pinned_context_block, reply_annotation, user_context_block};
pub use format::{format_context_for_llm, format_message_content, reply_prefix_with_fallback, FormattedContext};
pub use prioritize::get_prioritised_context;
pub use sanitize::{discord_to_llm_readable, llm_to_discord};
pub use snippet::smart_snippet;
pub use types::{HistoryContent, HistoryEntry, Role};
