//! Gateway admission and per-channel permission resolution (§4.8 steps 1-5).
//!
//! `InlineConfigOverride` is the on-disk shape at both the server and
//! channel level (§3 `InlineResponseConfig`); scalars are `Option` so an
//! absent value means "inherit from the level below", while the four
//! permission lists are always present and combined by union rather than
//! override (§3: "effective config = hardcoded defaults ◁ server-level
//! values ◁ channel-level values, with the four permission lists combined
//! by set union across levels rather than override").

use chorus_core::config::InlineDefaults;
use chorus_core::Snowflake;
use serde::{Deserialize, Serialize};

/// One of the three inline-engine model tiers (§3 `InlineResponseConfig.model_type`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    Ask,
    Think,
    Chat,
}

impl Default for ModelType {
    fn default() -> Self {
        ModelType::Ask
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InlineConfigOverride {
    pub enabled: Option<bool>,
    pub trigger_on_start_only: Option<bool>,
    pub model_type: Option<ModelType>,
    pub context_messages: Option<u32>,
    pub user_context_messages: Option<u32>,
    pub use_streaming: Option<bool>,
    #[serde(default)]
    pub member_blacklist: Vec<Snowflake>,
    #[serde(default)]
    pub role_blacklist: Vec<Snowflake>,
    #[serde(default)]
    pub member_whitelist: Vec<Snowflake>,
    #[serde(default)]
    pub role_whitelist: Vec<Snowflake>,
}

/// The fully resolved per-channel configuration a trigger is evaluated
/// against — the result of merging hardcoded defaults, the server
/// override, and the channel override.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineChannelConfig {
    pub enabled: bool,
    pub trigger_on_start_only: bool,
    pub model_type: ModelType,
    pub context_messages: u32,
    pub user_context_messages: u32,
    pub use_streaming: bool,
    pub member_blacklist: Vec<Snowflake>,
    pub role_blacklist: Vec<Snowflake>,
    pub member_whitelist: Vec<Snowflake>,
    pub role_whitelist: Vec<Snowflake>,
}

impl InlineChannelConfig {
    /// Merge defaults ◁ server ◁ channel: scalars take the most specific
    /// value present, and the four lists are unioned across all three
    /// levels (defaults never contribute list entries of their own).
    pub fn merge(defaults: &InlineDefaults, server: &InlineConfigOverride, channel: &InlineConfigOverride) -> Self {
        Self {
            enabled: channel.enabled.or(server.enabled).unwrap_or(false),
            trigger_on_start_only: channel
                .trigger_on_start_only
                .or(server.trigger_on_start_only)
                .unwrap_or(defaults.trigger_on_start_only),
            model_type: channel.model_type.or(server.model_type).unwrap_or_default(),
            context_messages: channel
                .context_messages
                .or(server.context_messages)
                .unwrap_or(defaults.context_messages),
            user_context_messages: channel
                .user_context_messages
                .or(server.user_context_messages)
                .unwrap_or(defaults.user_context_messages),
            use_streaming: channel.use_streaming.or(server.use_streaming).unwrap_or(defaults.use_streaming),
            member_blacklist: union(&server.member_blacklist, &channel.member_blacklist),
            role_blacklist: union(&server.role_blacklist, &channel.role_blacklist),
            member_whitelist: union(&server.member_whitelist, &channel.member_whitelist),
            role_whitelist: union(&server.role_whitelist, &channel.role_whitelist),
        }
    }
}

fn union(a: &[Snowflake], b: &[Snowflake]) -> Vec<Snowflake> {
    let mut out = a.to_vec();
    for &id in b {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// The inbound facts the gateway pre-filter and permission resolver need,
/// already extracted from the native SDK message type.
pub struct InlineGateEvent<'a> {
    pub is_self_bot: bool,
    pub in_guild: bool,
    pub chatbot_enabled: bool,
    pub content: &'a str,
    pub mention_tokens: &'a [String],
    pub author_id: Snowflake,
    pub author_role_ids: &'a [Snowflake],
    pub everyone_role_id: Snowflake,
}

/// §4.8 step 5: blacklist beats whitelist, default deny.
pub fn resolve_permission(config: &InlineChannelConfig, author_id: Snowflake, author_role_ids: &[Snowflake], everyone_role_id: Snowflake) -> bool {
    if config.member_blacklist.contains(&author_id) || author_role_ids.iter().any(|r| config.role_blacklist.contains(r)) {
        return false;
    }
    if config.role_whitelist.contains(&everyone_role_id)
        || config.member_whitelist.contains(&author_id)
        || author_role_ids.iter().any(|r| config.role_whitelist.contains(r))
    {
        return true;
    }
    false
}

/// Full §4.8 admission check (steps 1-5). `event.content` must already be
/// the raw, untrimmed message text so `trigger_on_start_only` can check the
/// literal prefix.
pub fn admits(config: &InlineChannelConfig, event: &InlineGateEvent) -> bool {
    if event.is_self_bot || !event.in_guild {
        return false;
    }
    if event.chatbot_enabled {
        return false;
    }
    if !config.enabled {
        return false;
    }
    let mentions_bot = event.mention_tokens.iter().any(|tok| event.content.contains(tok.as_str()));
    if !mentions_bot {
        return false;
    }
    if config.trigger_on_start_only {
        let starts_with_mention = event.mention_tokens.iter().any(|tok| event.content.trim_start().starts_with(tok.as_str()));
        if !starts_with_mention {
            return false;
        }
    }
    resolve_permission(config, event.author_id, event.author_role_ids, event.everyone_role_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn effective(enabled: bool) -> InlineChannelConfig {
        InlineChannelConfig {
            enabled,
            trigger_on_start_only: true,
            model_type: ModelType::Ask,
            context_messages: 30,
            user_context_messages: 15,
            use_streaming: true,
            member_blacklist: Vec::new(),
            role_blacklist: Vec::new(),
            member_whitelist: Vec::new(),
            role_whitelist: Vec::new(),
        }
    }

    fn event<'a>(content: &'a str, tokens: &'a [String], author_id: Snowflake, roles: &'a [Snowflake]) -> InlineGateEvent<'a> {
        InlineGateEvent {
            is_self_bot: false,
            in_guild: true,
            chatbot_enabled: false,
            content,
            mention_tokens: tokens,
            author_id,
            author_role_ids: roles,
            everyone_role_id: 999,
        }
    }

    #[test]
    fn blacklisted_member_denied_even_if_whitelisted_role() {
        let mut config = effective(true);
        config.member_blacklist.push(5);
        config.role_whitelist.push(10);
        assert!(!resolve_permission(&config, 5, &[10], 999));
    }

    #[test]
    fn blacklisted_role_denied_even_if_whitelisted_member() {
        let mut config = effective(true);
        config.role_blacklist.push(10);
        config.member_whitelist.push(5);
        assert!(!resolve_permission(&config, 5, &[10], 999));
    }

    #[test]
    fn everyone_whitelisted_allows_all_non_blacklisted() {
        let mut config = effective(true);
        config.role_whitelist.push(999);
        assert!(resolve_permission(&config, 1, &[], 999));
    }

    #[test]
    fn default_deny_when_neither_list_matches() {
        let config = effective(true);
        assert!(!resolve_permission(&config, 1, &[], 999));
    }

    #[test]
    fn disabled_channel_never_admits() {
        let config = effective(false);
        let tokens = vec!["<@1>".to_string()];
        let e = event("<@1> hello", &tokens, 5, &[]);
        assert!(!admits(&config, &e));
    }

    #[test]
    fn chatbot_enabled_channel_never_admits() {
        let mut config = effective(true);
        config.role_whitelist.push(999);
        let tokens = vec!["<@1>".to_string()];
        let mut e = event("<@1> hello", &tokens, 5, &[]);
        e.chatbot_enabled = true;
        assert!(!admits(&config, &e));
    }

    #[test]
    fn trigger_on_start_only_rejects_mid_message_mention() {
        let mut config = effective(true);
        config.role_whitelist.push(999);
        let tokens = vec!["<@1>".to_string()];
        let e = event("hey <@1> can you help", &tokens, 5, &[]);
        assert!(!admits(&config, &e));
    }

    #[test]
    fn admits_when_all_gates_pass() {
        let mut config = effective(true);
        config.role_whitelist.push(999);
        let tokens = vec!["<@1>".to_string(), "<@!1>".to_string()];
        let e = event("<@!1> can you help", &tokens, 5, &[]);
        assert!(admits(&config, &e));
    }

    #[test]
    fn merge_unions_permission_lists_across_levels() {
        let defaults = InlineDefaults::default();
        let mut server = InlineConfigOverride::default();
        server.enabled = Some(true);
        server.role_whitelist.push(1);
        let mut channel = InlineConfigOverride::default();
        channel.role_whitelist.push(2);
        channel.member_blacklist.push(3);

        let merged = InlineChannelConfig::merge(&defaults, &server, &channel);
        assert!(merged.enabled);
        assert_eq!(merged.role_whitelist, vec![1, 2]);
        assert_eq!(merged.member_blacklist, vec![3]);
    }

    #[test]
    fn merge_channel_scalar_overrides_server_scalar() {
        let defaults = InlineDefaults::default();
        let mut server = InlineConfigOverride::default();
        server.use_streaming = Some(true);
        let mut channel = InlineConfigOverride::default();
        channel.use_streaming = Some(false);

        let merged = InlineChannelConfig::merge(&defaults, &server, &channel);
        assert!(!merged.use_streaming);
    }
}
