use crate::{event::*, helper::MessageHelper, plugin::*};
use anyhow::Result;

/// Lists the pending queue.
pub struct ListRawLeads;

/// Lists the lead files.
pub struct ListColdLeads;

#[serenity::async_trait]
impl Plugin for ListRawLeads {
    fn name(&self) -> &'static str {
        "listrawleads"
    }

    fn usage(&self, ctx: &Context) -> Option<String> {
        Some(format!(
            "{}{} - list leads waiting for an email",
            ctx.cfg.general.command_prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, _)) = event.is_bot_cmd(ctx, self.name()) else {
            return Ok(EventHandled::No);
        };

        let pending = ctx.store.read().await.queue.list_pending().await?;
        if pending.is_empty() {
            msg.reply(ctx.cache_http, "No leads found in the database.")
                .await?;
            return Ok(EventHandled::Yes);
        }

        let mut reply = format!("Total leads: {}\n\n", pending.len());
        for (i, lead) in pending.iter().enumerate() {
            reply.push_str(&format!(
                "{}. {} - {} ({})\n",
                i + 1,
                lead.company(),
                lead.get("industry").unwrap_or_default(),
                lead.get("location").unwrap_or_default(),
            ));
        }

        msg.reply_long(ctx, &reply).await?;
        Ok(EventHandled::Yes)
    }
}

#[serenity::async_trait]
impl Plugin for ListColdLeads {
    fn name(&self) -> &'static str {
        "listcoldleads"
    }

    fn usage(&self, ctx: &Context) -> Option<String> {
        Some(format!(
            "{}{} - list all lead files",
            ctx.cfg.general.command_prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, _)) = event.is_bot_cmd(ctx, self.name()) else {
            return Ok(EventHandled::No);
        };

        let store = ctx.store.read().await;
        let dir = store.files.path().to_string_lossy().into_owned();
        let names = store.files.list().await?;
        if names.is_empty() {
            msg.reply(
                ctx.cache_http,
                format!("No JSON files found in the '{}' folder.", dir),
            )
            .await?;
            return Ok(EventHandled::Yes);
        }

        let mut reply = format!(
            "Found {} JSON file(s) in '{}' folder:\n\n",
            names.len(),
            dir
        );
        for (i, name) in names.iter().enumerate() {
            match store.files.company(name).await {
                Some(company) => {
                    reply.push_str(&format!(
                        "{}. {} - Contains data for {}\n",
                        i + 1,
                        name,
                        company
                    ))
                }
                None => reply.push_str(&format!("{}. {}\n", i + 1, name)),
            }
        }
        drop(store);

        msg.reply_long(ctx, &reply).await?;
        Ok(EventHandled::Yes)
    }
}
