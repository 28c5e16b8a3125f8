//! Miscellaneous convenience methods

use crate::context::Context;
use anyhow::Result;
use regex::Regex;
use serenity::all::{ChannelId, Http};
use std::{collections::BTreeMap, sync::LazyLock};

/// Discord rejects messages over 2000 characters.  Keep some margin.
pub const MESSAGE_LIMIT: usize = 1900;

static KEY_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(\w+)="([^"]+)""#).expect("valid key/value regex"));

/// Parse `key="value"` pairs out of command arguments.  Later duplicates win.
pub fn parse_key_values(args: &str) -> BTreeMap<String, String> {
    KEY_VALUE
        .captures_iter(args)
        .map(|caps| (caps[1].to_owned(), caps[2].to_owned()))
        .collect()
}

/// Split text into pieces no longer than `limit` characters, preferring line boundaries.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = line.chars().count();
        if current_len + line_len <= limit {
            current.push_str(line);
            current_len += line_len;
            continue;
        }

        if !current.is_empty() {
            push_chunk(&mut chunks, std::mem::take(&mut current));
            current_len = 0;
        }

        // A single line over the limit gets cut wherever it has to be.
        let mut chars = line.chars().peekable();
        while chars.peek().is_some() {
            let piece: String = chars.by_ref().take(limit).collect();
            let piece_len = piece.chars().count();
            if piece_len == limit {
                push_chunk(&mut chunks, piece);
            } else {
                current = piece;
                current_len = piece_len;
            }
        }
    }

    push_chunk(&mut chunks, current);
    chunks
}

// Discord rejects messages that are nothing but whitespace.
fn push_chunk(chunks: &mut Vec<String>, chunk: String) {
    if !chunk.trim().is_empty() {
        chunks.push(chunk);
    }
}

/// Post text to a channel, split over as many messages as needed.
pub async fn say_long(http: &Http, channel_id: ChannelId, text: &str) -> Result<()> {
    for chunk in split_message(text, MESSAGE_LIMIT) {
        channel_id.say(http, chunk).await?;
    }
    Ok(())
}

#[serenity::async_trait]
pub trait MessageHelper {
    async fn reply_long(&self, ctx: &Context, text: &str) -> Result<()>;
}

#[serenity::async_trait]
impl MessageHelper for serenity::all::Message {
    /// Reply with the first chunk and post the rest to the channel.
    async fn reply_long(&self, ctx: &Context, text: &str) -> Result<()> {
        let mut chunks = split_message(text, MESSAGE_LIMIT).into_iter();
        let Some(first) = chunks.next() else {
            return Ok(());
        };

        self.reply(ctx.cache_http, first).await?;
        for chunk in chunks {
            self.channel_id.say(ctx.http, chunk).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_values_are_extracted() {
        let parsed = parse_key_values(
            r#"company="Al Afaq Insurance Brokers" industry="Insurance" junk location="Dubai, UAE""#,
        );

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed["company"], "Al Afaq Insurance Brokers");
        assert_eq!(parsed["location"], "Dubai, UAE");
    }

    #[test]
    fn empty_values_are_ignored() {
        let parsed = parse_key_values(r#"company="" industry="Retail""#);
        assert!(!parsed.contains_key("company"));
        assert_eq!(parsed["industry"], "Retail");
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("hello\nworld\n", 100), vec!["hello\nworld\n"]);
        assert!(split_message("", 100).is_empty());
    }

    #[test]
    fn long_text_splits_on_lines() {
        let text = "aaaa\nbbbb\ncccc\n";
        let chunks = split_message(text, 10);

        assert_eq!(chunks, vec!["aaaa\nbbbb\n", "cccc\n"]);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn overlong_line_is_cut() {
        let text = "x".repeat(25);
        let chunks = split_message(&text, 10);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn blank_lines_after_a_cut_line_are_not_sent_alone() {
        // The cut leaves an empty chunk, so the blank lines would otherwise form one.
        let chunks = split_message("aaaa\nbbbbbbbbb\n\n\ncccc\n", 5);

        assert_eq!(chunks, vec!["aaaa\n", "bbbbb", "bbbb\n", "cccc\n"]);
        assert!(chunks.iter().all(|c| !c.trim().is_empty()));
    }
}
