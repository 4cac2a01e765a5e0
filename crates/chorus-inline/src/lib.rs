//! Inline-response gateway (§4.8): a mention-triggered reply path distinct
//! from chatbot-mode channels, with its own gathered (not persisted) context
//! window, per-channel worker pool, and defaults◁server◁channel config merge.

pub mod config_store;
pub mod engine;
pub mod gather;
pub mod host;
pub mod permission;

pub use config_store::InlineConfigStore;
pub use engine::{InlineResponseEngine, ModelMap};
pub use gather::{gather_window, GatherConfig};
pub use host::InlineHost;
pub use permission::{admits, resolve_permission, InlineChannelConfig, InlineConfigOverride, InlineGateEvent, ModelType};
