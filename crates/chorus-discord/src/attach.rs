//! OCR-candidate extraction from an inbound message (§4.7): find an eligible
//! image — attachment first, then the first bare URL in the content — fetch
//! its bytes, and replay the same cheap pre-validation the gateway is
//! supposed to apply before a job ever reaches [`chorus_ocr::OcrPipeline`].

use chorus_ocr::{attachment_passes_cheap_checks, check_dimensions, first_url};
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::id::{ChannelId, MessageId};
use tracing::warn;

use crate::send::send_chunked;

pub struct OcrCandidate {
    pub image_bytes: Vec<u8>,
}

/// §4.7 gateway pre-validation: an eligible attachment, or else the first URL
/// in the message content. Returns `None` as soon as any cheap check fails,
/// so a channel with no OCR candidates never pays for a download.
pub async fn find_ocr_candidate(
    client: &reqwest::Client,
    msg: &Message,
    max_attachment_bytes: u64,
    min_width: u32,
    min_height: u32,
) -> Option<OcrCandidate> {
    if let Some(attachment) = msg.attachments.iter().find(|a| {
        attachment_passes_cheap_checks(a.content_type.as_deref(), a.size as u64, max_attachment_bytes)
    }) {
        return fetch_and_check(client, &attachment.url, max_attachment_bytes, min_width, min_height).await;
    }

    let url = first_url(&msg.content)?.to_string();
    fetch_and_check(client, &url, max_attachment_bytes, min_width, min_height).await
}

async fn fetch_and_check(
    client: &reqwest::Client,
    url: &str,
    max_attachment_bytes: u64,
    min_width: u32,
    min_height: u32,
) -> Option<OcrCandidate> {
    let resp = match client.get(url).send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            warn!(url, status = %r.status(), "ocr candidate fetch returned non-success status");
            return None;
        }
        Err(e) => {
            warn!(url, error = %e, "ocr candidate fetch failed");
            return None;
        }
    };

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = match resp.bytes().await {
        Ok(b) => b.to_vec(),
        Err(e) => {
            warn!(url, error = %e, "failed to read ocr candidate body");
            return None;
        }
    };

    if !attachment_passes_cheap_checks(content_type.as_deref(), bytes.len() as u64, max_attachment_bytes) {
        return None;
    }
    if check_dimensions(&bytes, min_width, min_height).is_none() {
        return None;
    }

    Some(OcrCandidate { image_bytes: bytes })
}

/// Deliver a completed OCR job per its resolved [`chorus_ocr::routing::RouteDecision`]
/// (§4.7.1). Nothing is sent when no pattern matched the recognised text —
/// the match itself, not the raw OCR output, is what gets surfaced in Discord.
pub async fn deliver_ocr_outcome(http: &Http, outcome: &chorus_ocr::OcrOutcome) {
    use chorus_ocr::RouteDecision;

    let Some(response) = &outcome.matched_response else {
        return;
    };

    let source_channel = ChannelId::new(outcome.channel_id);
    let message_id = MessageId::new(outcome.message_id);

    match outcome.route {
        RouteDecision::ReplyInPlace => {
            if let Err(e) = send_chunked(http, source_channel, response, Some(message_id)).await {
                warn!(error = %e, channel_id = outcome.channel_id, "failed to send ocr reply in place");
            }
        }
        RouteDecision::PostLinkThenReply { channel } => {
            let response_channel = ChannelId::new(channel);
            let link = format!(
                "https://discord.com/channels/{}/{}/{}",
                outcome.guild_id, outcome.channel_id, outcome.message_id
            );
            if let Err(e) = response_channel.say(http, format!("OCR match for {link}")).await {
                warn!(error = %e, channel_id = channel, "failed to post ocr link");
            }
            if let Err(e) = send_chunked(http, source_channel, response, Some(message_id)).await {
                warn!(error = %e, channel_id = outcome.channel_id, "failed to send ocr reply");
            }
        }
        RouteDecision::Fallback { channel } => {
            let fallback_channel = ChannelId::new(channel);
            if let Err(e) = send_chunked(http, fallback_channel, response, None).await {
                warn!(error = %e, channel_id = channel, "failed to send ocr fallback response");
            }
        }
        RouteDecision::Drop => {}
    }
}
