use poise::serenity_prelude as serenity;

use super::{ChatPlatform, SendOptions};
use crate::error::Result;

/// Discord rejects messages over 2000 characters; keep headroom
pub const MAX_MESSAGE_CHARS: usize = 1950;

/// Split text into pieces of at most `budget` characters.
/// Pieces concatenate back to the input; character boundaries are respected.
pub fn split_message(text: &str, budget: usize) -> Vec<String> {
    let budget = budget.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for ch in text.chars() {
        if count == budget {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(ch);
        count += 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Send a possibly long message as sequential chunks, each with the same options
pub async fn send_chunked(
    platform: &dyn ChatPlatform,
    channel_id: serenity::ChannelId,
    text: &str,
    options: SendOptions,
) -> Result<()> {
    for chunk in split_message(text, MAX_MESSAGE_CHARS) {
        platform
            .send_channel_message(channel_id, &chunk, options)
            .await?;
    }
    Ok(())
}

/// Direct-message variant of [`send_chunked`]
pub async fn send_direct_chunked(
    platform: &dyn ChatPlatform,
    user_id: serenity::UserId,
    text: &str,
) -> Result<()> {
    for chunk in split_message(text, MAX_MESSAGE_CHARS) {
        platform.send_direct_message(user_id, &chunk).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::fake::{FakePlatform, Sent};
    use std::time::Duration;

    #[test]
    fn test_short_message_is_single_chunk() {
        assert_eq!(split_message("hello", 10), vec!["hello".to_string()]);
    }

    #[test]
    fn test_empty_message_has_no_chunks() {
        assert!(split_message("", 10).is_empty());
    }

    #[test]
    fn test_long_message_round_trips() {
        let text: String = (0..5000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = split_message(&text, MAX_MESSAGE_CHARS);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_MESSAGE_CHARS));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn test_exact_multiple_of_budget() {
        let text = "abcdef";
        let chunks = split_message(text, 3);
        assert_eq!(chunks, vec!["abc".to_string(), "def".to_string()]);
    }

    #[test]
    fn test_multibyte_characters_are_not_split() {
        let text = "领取我和我的领航猫👍".repeat(7);
        let chunks = split_message(&text, 4);

        assert!(chunks.iter().all(|c| c.chars().count() <= 4));
        assert_eq!(chunks.concat(), text);
    }

    #[tokio::test]
    async fn test_send_chunked_preserves_options() {
        let platform = FakePlatform::new();
        let channel = serenity::ChannelId::new(7);
        let text = "x".repeat(MAX_MESSAGE_CHARS + 10);
        let options = SendOptions::delete_after(Duration::from_secs(60));

        send_chunked(&platform, channel, &text, options).await.unwrap();

        let sent = platform.sent();
        assert_eq!(sent.len(), 2);
        for s in &sent {
            match s {
                Sent::Channel { options: o, .. } => assert_eq!(*o, options),
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
