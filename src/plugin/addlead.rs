use crate::{
    error::LeadError,
    event::*,
    helper::parse_key_values,
    log_internal,
    logging::PrintColor,
    plugin::*,
};
use anyhow::Result;

/// Appends a lead to the pending queue.
pub struct AddLead;

impl AddLead {
    fn syntax(&self, ctx: &Context) -> String {
        format!(
            "{}{} company=\"Company Name\" industry=\"Industry\" business_type=\"Business Type\" \
             location=\"Location\"",
            ctx.cfg.general.command_prefix,
            self.name()
        )
    }
}

#[serenity::async_trait]
impl Plugin for AddLead {
    fn name(&self) -> &'static str {
        "addlead"
    }

    fn usage(&self, ctx: &Context) -> Option<String> {
        Some(format!("{} - add a new business lead", self.syntax(ctx)))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()) else {
            return Ok(EventHandled::No);
        };

        let fields = parse_key_values(args);
        let result = ctx.store.write().await.queue.append_lead(fields).await;

        let reply = match result {
            Ok(lead) => {
                log_internal!("Added lead {}", lead.color());
                format!("Business '{}' added successfully!", lead.company())
            }
            Err(e @ LeadError::Validation { .. }) => {
                format!("Error: {}\nUsage: `{}`", e, self.syntax(ctx))
            }
            Err(e) => return Err(e.into()),
        };

        msg.reply(ctx.cache_http, reply).await?;
        Ok(EventHandled::Yes)
    }
}
