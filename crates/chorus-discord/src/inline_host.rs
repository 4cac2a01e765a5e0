//! [`InlineHost`] implementation backing [`chorus_inline::InlineResponseEngine`]
//! (§4.8 steps 1-2, 4): history fetch, member resolution, and the placeholder
//! reply that seeds a [`crate::send::DiscordPlainSink`] chain.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chorus_core::{ChorusError, RawMessage, Result, Snowflake, UserFacts};
use chorus_inline::InlineHost;
use chorus_stream::PlainReplySink;
use serenity::builder::{CreateMessage, GetMessages};
use serenity::http::Http;
use serenity::model::id::{ChannelId, GuildId, MessageId, UserId};
use serenity::model::channel::Message;

use crate::conversion::message_to_raw;
use crate::send::DiscordPlainSink;

pub struct DiscordInlineHost {
    http: Arc<Http>,
    self_bot_id: Snowflake,
}

impl DiscordInlineHost {
    pub fn new(http: Arc<Http>, self_bot_id: Snowflake) -> Arc<Self> {
        Arc::new(Self { http, self_bot_id })
    }
}

/// Minimal `UserFacts` for a history message: role names aren't known from
/// the message payload alone, so `index_authors` (§4.8 step 4) re-fetches
/// the member record for every unique author before indexing.
fn author_facts(msg: &Message) -> UserFacts {
    let nick = msg.member.as_ref().and_then(|m| m.nick.clone());
    UserFacts {
        user_id: msg.author.id.get(),
        username: msg.author.name.clone(),
        display_name: nick.unwrap_or_else(|| msg.author.global_name.clone().unwrap_or_else(|| msg.author.name.clone())),
        guild_id: msg.guild_id.map(|g| g.get()).unwrap_or(0),
        guild_name: String::new(),
        roles: Vec::new(),
        avatar_url: msg.author.avatar_url(),
        status: None,
        is_bot: msg.author.bot,
    }
}

#[async_trait]
impl InlineHost for DiscordInlineHost {
    async fn fetch_history_batch(&self, channel_id: Snowflake, before: Option<Snowflake>, limit: u32) -> Result<Vec<RawMessage>> {
        let mut builder = GetMessages::new().limit(limit.clamp(1, 100) as u8);
        if let Some(before) = before {
            builder = builder.before(MessageId::new(before));
        }
        let messages = ChannelId::new(channel_id)
            .messages(&self.http, builder)
            .await
            .map_err(|e| ChorusError::Discord(e.to_string()))?;

        Ok(messages
            .iter()
            .map(|msg| message_to_raw(msg, self.self_bot_id, author_facts(msg)))
            .collect())
    }

    async fn fetch_members(&self, guild_id: Snowflake, user_ids: &[Snowflake]) -> Result<Vec<UserFacts>> {
        let guild = GuildId::new(guild_id);
        let role_names = self.fetch_role_names(guild_id).await?;
        let mut out = Vec::with_capacity(user_ids.len());
        for &user_id in user_ids {
            if let Ok(member) = guild.member(&self.http, UserId::new(user_id)).await {
                let names: Vec<String> = member
                    .roles
                    .iter()
                    .filter(|r| r.get() != guild_id)
                    .filter_map(|r| role_names.get(&r.get()).cloned())
                    .collect();
                out.push(crate::conversion::member_facts(&member, "", names));
            }
        }
        Ok(out)
    }

    async fn fetch_role_names(&self, guild_id: Snowflake) -> Result<HashMap<Snowflake, String>> {
        let roles = self
            .http
            .get_guild_roles(GuildId::new(guild_id))
            .await
            .map_err(|e| ChorusError::Discord(e.to_string()))?;
        // The `@everyone` role's id always equals the guild's id.
        Ok(roles
            .into_iter()
            .filter(|r| r.id.get() != guild_id)
            .map(|r| (r.id.get(), r.name))
            .collect())
    }

    async fn send_placeholder(&self, channel_id: Snowflake, text: &str) -> Result<Snowflake> {
        let message = ChannelId::new(channel_id)
            .send_message(&self.http, CreateMessage::new().content(text))
            .await
            .map_err(|e| ChorusError::Discord(e.to_string()))?;
        Ok(message.id.get())
    }

    fn plain_sink(&self, channel_id: Snowflake, placeholder_id: Snowflake) -> Arc<dyn PlainReplySink> {
        Arc::new(DiscordPlainSink::new(self.http.clone(), channel_id, placeholder_id))
    }
}
