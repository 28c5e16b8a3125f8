use crate::{event::*, log_internal, pipeline::Pipeline, plugin::*};
use anyhow::Result;

/// Starts the email pipeline over every pending lead.
pub struct RunEmailCrew;

#[serenity::async_trait]
impl Plugin for RunEmailCrew {
    fn name(&self) -> &'static str {
        "runemailcrew"
    }

    fn usage(&self, ctx: &Context) -> Option<String> {
        Some(format!(
            "{}{} - research every pending lead and draft an email for it",
            ctx.cfg.general.command_prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, _)) = event.is_bot_cmd(ctx, self.name()) else {
            return Ok(EventHandled::No);
        };

        // Held until the run is spawned so two commands can't both start one.
        let mut vstate = ctx.vstate.write().await;
        if vstate.pipeline_running {
            drop(vstate);
            msg.reply(
                ctx.cache_http,
                "Email automation is already running. Please wait for it to finish.",
            )
            .await?;
            return Ok(EventHandled::Yes);
        }

        let store = ctx.store.read().await;
        let leads = store.queue.list_pending().await?;
        let files = store.files.clone();
        drop(store);

        if leads.is_empty() {
            drop(vstate);
            msg.reply(
                ctx.cache_http,
                format!(
                    "No leads found in the database. Please add leads first using the `{}addlead` command.",
                    ctx.cfg.general.command_prefix
                ),
            )
            .await?;
            return Ok(EventHandled::Yes);
        }

        let count = leads.len();
        vstate.pipeline_running = true;
        Pipeline::from_config(ctx.cfg, ctx.gate.clone(), files).spawn(
            leads.into_vec(),
            Some(msg.channel_id),
            ctx.pipeline_tx.clone(),
        );
        drop(vstate);
        log_internal!("Started email pipeline for {} lead(s)", count);

        msg.reply(
            ctx.cache_http,
            format!(
                "Starting Email automation for {} leads. This may take some time...",
                count
            ),
        )
        .await?;
        Ok(EventHandled::Yes)
    }
}
