use crate::{event::*, log_event, log_internal, logging::*, plugin::*};
use anyhow::Result;

/// Reports what the lead store holds once the connection to Discord is ready.
pub struct Ready;

#[serenity::async_trait]
impl Plugin for Ready {
    fn name(&self) -> &'static str {
        "ready"
    }

    fn usage(&self, _ctx: &Context) -> Option<String> {
        None
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Event::Ready(ready) = event else {
            return Ok(EventHandled::No);
        };
        log_event!(
            "Connected to {} server(s) as {}",
            ready.guilds.len(),
            ready.user.color(),
        );

        let store = ctx.store.read().await;
        let pending = store.queue.list_pending().await?.len();
        let files = store.files.list().await?.len();
        log_internal!(
            "{} pending lead(s), {} lead file(s) in {}",
            pending,
            files,
            LeadFile(&store.files.path().to_string_lossy()).color(),
        );

        Ok(EventHandled::Yes)
    }
}
