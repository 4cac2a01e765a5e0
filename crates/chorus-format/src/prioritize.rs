use chorus_conversation::ConversationMessage;
use chorus_core::Snowflake;

/// Keep the tail of `max_context_messages`, guaranteeing the requesting
/// user's last `max_user_context_messages` survive the cut even if other
/// authors would otherwise crowd them out, then re-sort chronologically
/// (§4.5 `get_prioritised_context`).
pub fn get_prioritised_context(
    mut messages: Vec<ConversationMessage>,
    requesting_user_id: Snowflake,
    max_context_messages: usize,
    max_user_context_messages: usize,
) -> Vec<ConversationMessage> {
    if messages.is_empty() {
        return messages;
    }
    messages.sort_by_key(|m| m.timestamp);

    let recent: Vec<ConversationMessage> = if messages.len() > max_context_messages {
        messages.split_off(messages.len() - max_context_messages)
    } else {
        messages
    };

    let (requesting_user_messages, other_messages): (Vec<_>, Vec<_>) =
        recent.into_iter().partition(|m| m.user_id == requesting_user_id);

    let keep_from_user = requesting_user_messages
        .len()
        .saturating_sub(max_user_context_messages);
    let mut prioritised: Vec<ConversationMessage> = requesting_user_messages[keep_from_user..].to_vec();
    let overflow_user_messages = &requesting_user_messages[..keep_from_user];

    let remaining_space = max_context_messages.saturating_sub(prioritised.len());
    if remaining_space > 0 {
        let mut additional: Vec<ConversationMessage> = other_messages
            .into_iter()
            .chain(overflow_user_messages.iter().cloned())
            .collect();
        additional.sort_by_key(|m| m.timestamp);
        let keep_from_additional = additional.len().saturating_sub(remaining_space);
        prioritised.extend(additional[keep_from_additional..].iter().cloned());
    }

    prioritised.sort_by_key(|m| m.timestamp);
    if prioritised.len() > max_context_messages {
        let drop = prioritised.len() - max_context_messages;
        prioritised.drain(0..drop);
    }
    prioritised
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: u64, user_id: u64, ts: i64) -> ConversationMessage {
        ConversationMessage {
            message_id: id,
            user_id,
            username: "u".to_string(),
            content: format!("msg {id}"),
            timestamp: ts,
            is_bot_response: false,
            is_self_bot_response: false,
            referenced_message_id: None,
            attachment_urls: Vec::new(),
            embed_urls: Vec::new(),
            multimodal_content: vec![chorus_core::ContentPart::text(format!("msg {id}"))],
        }
    }

    #[test]
    fn requesting_user_messages_are_never_starved_out() {
        // 20 other-user messages followed by 5 from the requester; with a
        // tight budget the requester's tail must still all survive.
        let mut messages: Vec<ConversationMessage> = (0..20).map(|i| msg(i, 2, i as i64)).collect();
        messages.extend((20..25).map(|i| msg(i, 1, i as i64)));

        let result = get_prioritised_context(messages, 1, 10, 5);
        let requester_count = result.iter().filter(|m| m.user_id == 1).count();
        assert_eq!(requester_count, 5);
        assert!(result.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn result_never_exceeds_max_context_messages() {
        let messages: Vec<ConversationMessage> = (0..50).map(|i| msg(i, i % 3, i as i64)).collect();
        let result = get_prioritised_context(messages, 0, 10, 3);
        assert!(result.len() <= 10);
    }

    #[test]
    fn empty_input_returns_empty() {
        assert!(get_prioritised_context(Vec::new(), 1, 10, 5).is_empty());
    }
}
