//! Streaming relay: turns a provider-agnostic stream of LLM output into a
//! sequence of Discord messages that grow in place via edits (§4.9).

pub mod chunking;
pub mod metrics;
pub mod relay;
pub mod sink;
pub mod thinking;

pub use chunking::split_message;
pub use metrics::StreamMetrics;
pub use relay::{drive_embed, drive_plain, publish_plain};
pub use sink::{EmbedReplySink, PlainReplySink, SinkError};
pub use thinking::{strip_thinking_tags, StripResult};
