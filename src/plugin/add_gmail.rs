use crate::{event::*, log_internal, logging::*, plugin::*};
use anyhow::Result;
use serde_json::Value;

/// Records a contact email address in a lead file.
pub struct AddGmail;

#[serenity::async_trait]
impl Plugin for AddGmail {
    fn name(&self) -> &'static str {
        "add_gmail"
    }

    fn usage(&self, ctx: &Context) -> Option<String> {
        Some(format!(
            "{}{} <filename.json> <someone@example.com> - add a contact email to a lead file",
            ctx.cfg.general.command_prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()) else {
            return Ok(EventHandled::No);
        };

        let mut terms = args.split_whitespace();
        let (Some(file), Some(email)) = (terms.next(), terms.next()) else {
            let usage = self.usage(ctx).unwrap_or_default();
            msg.reply(ctx.cache_http, format!("Usage: `{}`", usage))
                .await?;
            return Ok(EventHandled::Yes);
        };

        if !email.contains('@') {
            msg.reply(
                ctx.cache_http,
                format!("'{}' does not look like an email address.", email),
            )
            .await?;
            return Ok(EventHandled::Yes);
        }

        let store = ctx.store.write().await;
        if !store.files.exists(file).await {
            let dir = store.files.path().to_string_lossy().into_owned();
            drop(store);
            msg.reply(
                ctx.cache_http,
                format!("File '{}' not found in the '{}' folder.", file, dir),
            )
            .await?;
            return Ok(EventHandled::Yes);
        }
        store
            .files
            .patch_lead_file(file, "email", Value::String(email.to_owned()))
            .await?;
        drop(store);
        log_internal!("Added email to {}", LeadFile(file).color());

        msg.reply(
            ctx.cache_http,
            format!("Successfully added email '{}' to '{}'.", email, file),
        )
        .await?;
        Ok(EventHandled::Yes)
    }
}
