use crate::{event::*, log_event, logging::*, plugin::*};
use anyhow::Result;

/// Logs every command addressed to the bot.  Never consumes the event.
pub struct CommandLog;

#[serenity::async_trait]
impl Plugin for CommandLog {
    fn name(&self) -> &'static str {
        "command_log"
    }

    fn usage(&self, _ctx: &Context) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Message(msg) = event else {
            return Ok(EventHandled::No);
        };
        if msg.author.bot || !msg.content.starts_with(&ctx.cfg.general.command_prefix) {
            return Ok(EventHandled::No);
        }

        log_event!(
            "{}{}{}{}{} {}",
            msg.guild_id.color(ctx.http).await,
            Glue.color(),
            msg.channel_id.color(ctx.http).await,
            Glue.color(),
            msg.author.color(),
            msg.content,
        );
        Ok(EventHandled::No)
    }
}
