use crate::{
    event::*,
    helper::{parse_key_values, MessageHelper, MESSAGE_LIMIT},
    plugin::*,
};
use anyhow::Result;
use serde_json::Value;

/// Displays one lead file, picked by list number or (partial) name.
pub struct ShowLead;

#[serenity::async_trait]
impl Plugin for ShowLead {
    fn name(&self) -> &'static str {
        "showlead"
    }

    fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = &ctx.cfg.general.command_prefix;
        Some(format!(
            "{}{} <number> | {}{} filename=\"name\" - show a lead file (number as in listcoldleads, \
             name may be partial)",
            prefix,
            self.name(),
            prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()) else {
            return Ok(EventHandled::No);
        };

        if args.is_empty() {
            let usage = self.usage(ctx).unwrap_or_default();
            msg.reply(
                ctx.cache_http,
                format!("Please specify either a file number or a filename: `{}`", usage),
            )
            .await?;
            return Ok(EventHandled::Yes);
        }

        let store = ctx.store.read().await;
        let name = match args.parse::<usize>() {
            Ok(index) => store.files.by_index(index).await?,
            Err(_) => {
                let query = parse_key_values(args)
                    .remove("filename")
                    .unwrap_or_else(|| args.to_owned());
                let found = store.files.resolve(&query).await?;
                if found.is_ambiguous() {
                    msg.reply(
                        ctx.cache_http,
                        format!(
                            "Multiple files match '{}'. Showing the first match: {}",
                            query, found.name
                        ),
                    )
                    .await?;
                }
                found.name
            }
        };
        let doc = store.files.read(&name).await?;
        drop(store);

        msg.reply_long(ctx, &render_lead(&name, &doc)).await?;
        Ok(EventHandled::Yes)
    }
}

/// Pretty-printed lead file, or a `key: value` summary of its first record when that would not
/// fit in one message.
fn render_lead(name: &str, doc: &Value) -> String {
    let pretty = serde_json::to_string_pretty(doc).unwrap_or_else(|_| doc.to_string());
    if pretty.chars().count() <= MESSAGE_LIMIT {
        return format!("**File: {}**\n\n```json\n{}\n```", name, pretty);
    }

    let record = match doc {
        Value::Array(items) => items.first().and_then(Value::as_object),
        Value::Object(map) => Some(map),
        _ => None,
    };

    let mut reply = format!("**File: {}** (Showing summary due to large size)\n\n", name);
    match record {
        Some(record) => {
            reply.push_str("```\n");
            for (key, value) in record {
                match value {
                    Value::String(s) => reply.push_str(&format!("{}: {}\n", key, s)),
                    other => reply.push_str(&format!("{}: {}\n", key, other)),
                }
            }
            reply.push_str("```");
        }
        None => {
            let truncated: String = pretty.chars().take(MESSAGE_LIMIT - 100).collect();
            reply.push_str(&format!("```json\n{}\n... (truncated) ```", truncated));
        }
    }
    reply
}
