use crate::model::Mention;
use im_proto::{MentionType, MsgId};

/// Parses `@everyone`, `@here`, and `@<userId>` tokens out of message
/// content. A user mention is any `@`-prefixed run of non-whitespace
/// characters that doesn't match the two reserved keywords; the id itself
/// isn't validated against the membership list here — an unknown id simply
/// never resolves to an online recipient downstream.
pub fn parse_mentions(message_id: MsgId, content: &str) -> Vec<Mention> {
    content
        .split_whitespace()
        .filter_map(|token| token.strip_prefix('@'))
        .map(|token| token.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '_' && c != '-'))
        .filter(|token| !token.is_empty())
        .map(|token| match token {
            "everyone" => Mention {
                message_id,
                mention_type: MentionType::Everyone,
                mentioned_user_id: None,
            },
            "here" => Mention {
                message_id,
                mention_type: MentionType::Here,
                mentioned_user_id: None,
            },
            user_id => Mention {
                message_id,
                mention_type: MentionType::User,
                mentioned_user_id: Some(user_id.to_string()),
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_everyone_here_and_user_mentions() {
        let msg_id = MsgId::generate();
        let mentions = parse_mentions(msg_id, "hey @everyone and @here, cc @u42!");

        assert_eq!(mentions.len(), 3);
        assert_eq!(mentions[0].mention_type, MentionType::Everyone);
        assert_eq!(mentions[1].mention_type, MentionType::Here);
        assert_eq!(mentions[2].mention_type, MentionType::User);
        assert_eq!(mentions[2].mentioned_user_id.as_deref(), Some("u42"));
    }

    #[test]
    fn plain_email_like_text_without_at_prefix_is_not_a_mention() {
        let mentions = parse_mentions(MsgId::generate(), "no mentions in this message");
        assert!(mentions.is_empty());
    }
}
