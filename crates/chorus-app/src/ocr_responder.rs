//! §4.7.1 OCR response routing: turns a completed [`OcrOutcome`] into the
//! actual Discord messages the route decision calls for. Kept in the binary
//! rather than `chorus-ocr` because it's the one piece of the OCR pipeline
//! that has to speak `serenity`.

use std::sync::Arc;

use chorus_ocr::{OcrOutcome, RouteDecision};
use serenity::builder::CreateMessage;
use serenity::http::Http;
use serenity::model::id::{ChannelId, MessageId};
use tracing::{info, warn};

/// Deliver one OCR outcome per §4.7.1. Outcomes with no matched response are
/// logged and dropped — there is nothing to say if no rule fired.
pub async fn respond(http: &Arc<Http>, outcome: OcrOutcome) {
    let Some(response) = outcome.matched_response else {
        info!(
            guild_id = outcome.guild_id,
            channel_id = outcome.channel_id,
            "ocr text matched no configured pattern, dropping"
        );
        return;
    };

    let source_channel = ChannelId::new(outcome.channel_id);
    let source_message = MessageId::new(outcome.message_id);

    match outcome.route {
        RouteDecision::ReplyInPlace => {
            if let Err(e) = source_channel
                .send_message(http, CreateMessage::new().content(response).reference_message((source_channel, source_message)))
                .await
            {
                warn!(error = %e, "failed to send ocr reply in place");
            }
        }
        RouteDecision::PostLinkThenReply { channel } => {
            let target = ChannelId::new(channel);
            let link = message_link(outcome.guild_id, outcome.channel_id, outcome.message_id);
            if let Err(e) = target.send_message(http, CreateMessage::new().content(format!("OCR match for {link}"))).await {
                warn!(error = %e, "failed to post ocr source link");
            }
            if let Err(e) = target.send_message(http, CreateMessage::new().content(response)).await {
                warn!(error = %e, "failed to post ocr response in linked channel");
            }
        }
        RouteDecision::Fallback { channel } => {
            let target = ChannelId::new(channel);
            let link = message_link(outcome.guild_id, outcome.channel_id, outcome.message_id);
            if let Err(e) = target.send_message(http, CreateMessage::new().content(format!("OCR match for {link}"))).await {
                warn!(error = %e, "failed to post ocr source link to fallback channel");
            }
            if let Err(e) = target.send_message(http, CreateMessage::new().content(response)).await {
                warn!(error = %e, "failed to post ocr response to fallback channel");
            }
        }
        RouteDecision::Drop => {
            warn!(guild_id = outcome.guild_id, channel_id = outcome.channel_id, "no ocr response route configured, dropping result");
        }
    }
}

fn message_link(guild_id: chorus_core::Snowflake, channel_id: chorus_core::Snowflake, message_id: chorus_core::Snowflake) -> String {
    format!("https://discord.com/channels/{guild_id}/{channel_id}/{message_id}")
}
