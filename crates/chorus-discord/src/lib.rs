//! Discord chat-platform adapter (§6 boundary): the one crate in the
//! workspace that touches `serenity` types. Everything upstream of
//! [`conversion`] only ever sees `RawMessage`/`UserFacts`/`ChannelFacts`.

pub mod adapter;
pub mod attach;
pub mod context;
pub mod conversion;
pub mod embed;
pub mod error;
pub mod handler;
pub mod inline_host;
pub mod send;

pub use adapter::DiscordAdapter;
pub use context::DiscordAppContext;
pub use embed::DiscordEmbedSink;
pub use error::DiscordError;
pub use handler::Handler;
pub use inline_host::DiscordInlineHost;
