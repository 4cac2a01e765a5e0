pub mod config;
pub mod error;
pub mod types;

pub use config::{ChannelChatbotConfigRanges, ChorusConfig, ModelTierConfig};
pub use error::{ChorusError, Result};
pub use types::{
    ChannelFacts, ChannelKind, ContentPart, PatternFlags, RawMediaKind, RawMediaRef, RawMessage,
    Snowflake, UrlRef, UserFacts,
};
