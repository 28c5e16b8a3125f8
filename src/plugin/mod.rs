use crate::{
    context::Context,
    event::{Event, EventHandled},
};
use anyhow::Result;

mod add_gmail;
mod addlead;
mod command_log;
mod email_crew;
mod help;
mod leads;
mod ready;
mod showlead;
mod staging;

#[serenity::async_trait]
pub trait Plugin: Sync + Send {
    /// Plugin name.  Doubles as the command name for command plugins
    fn name(&self) -> &'static str;
    /// Help message line.  None if no help message
    fn usage(&self, ctx: &Context) -> Option<String>;
    /// Potentially handle event.  Returns:
    /// - Ok(EventHandled::Yes) if the event has been handled and no other plugin should attempt to
    /// handle it
    /// - Ok(EventHandled::No) if another plugin should attempt to handle the event
    /// - Err if an error occurred
    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled>;
}

/// Ordered list of available plugins
pub fn plugins() -> Vec<Box<dyn Plugin>> {
    use crate::plugin::*;

    vec![
        // Core bot operations
        Box::new(command_log::CommandLog),
        Box::new(ready::Ready),
        Box::new(help::Help),
        // Leads
        Box::new(addlead::AddLead),
        Box::new(leads::ListRawLeads),
        Box::new(leads::ListColdLeads),
        Box::new(showlead::ShowLead),
        Box::new(add_gmail::AddGmail),
        // Staging
        Box::new(staging::StageFile),
        Box::new(staging::UnstageFile),
        Box::new(staging::ListStaged),
        Box::new(staging::Commit),
        // Email pipeline
        Box::new(email_crew::RunEmailCrew),
    ]
}
