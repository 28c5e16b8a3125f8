//! Serenity hands us one callback per Discord event.  This module turns them into a single Event
//! enum that is passed down the plugin chain.

use crate::{context::Context, log_error};
use serenity::all::{Message, Ready};

/// A Discord event
pub enum Event {
    Ready(Ready),
    Message(Message),
}

impl Event {
    // When an event occurs, iterate over all the plugins to see if any can/should handle it.
    //
    // A failing plugin ends the chain.  If the event was a message, the error goes back to its
    // author instead of taking the bot down.
    pub async fn handle(self, ctx: Context<'_>) {
        for plugin in crate::plugin::plugins() {
            match plugin.handle(&ctx, &self).await {
                Ok(EventHandled::Yes) => return,
                Ok(EventHandled::No) => continue,
                Err(err) => {
                    log_error!("Error in plugin {}: {:#}", plugin.name(), err);
                    if let Event::Message(msg) = &self {
                        let reply = format!("Error: {:#}", err);
                        if let Err(e) = msg.reply(ctx.cache_http, reply).await {
                            log_error!("Could not report error to user: {}", e);
                        }
                    }
                    return;
                }
            }
        }
    }

    // Check if a message should be interpreted as a bot command.
    //
    // These start with the command prefix, e. g. `DuDe addlead company="..."`.  Returns the
    // message and everything after the command name.
    pub fn is_bot_cmd<'e>(&'e self, ctx: &Context<'_>, cmd: &str) -> Option<(&'e Message, &'e str)> {
        let (msg, name, args) = self.bot_cmd(ctx)?;
        (name == cmd).then_some((msg, args))
    }

    /// Any bot command: the message, the command name and its arguments.
    pub fn bot_cmd<'e>(&'e self, ctx: &Context<'_>) -> Option<(&'e Message, &'e str, &'e str)> {
        let Event::Message(msg) = self else {
            return None;
        };
        // Bots, including this one, never issue commands.
        if msg.author.bot {
            return None;
        }

        let (name, args) = split_command(&msg.content, &ctx.cfg.general.command_prefix)?;
        Some((msg, name, args))
    }
}

/// Split `<prefix><name> <args>` into the command name and its trimmed arguments.
fn split_command<'m>(content: &'m str, prefix: &str) -> Option<(&'m str, &'m str)> {
    let rest = content.strip_prefix(prefix)?.trim_start();
    let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    (!name.is_empty()).then_some((name, args.trim()))
}

pub enum EventHandled {
    Yes,
    No,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_and_arguments_are_split() {
        assert_eq!(
            split_command(r#"DuDe addlead company="A B""#, "DuDe "),
            Some(("addlead", r#"company="A B""#))
        );
        assert_eq!(split_command("DuDe liststaged", "DuDe "), Some(("liststaged", "")));
        assert_eq!(
            split_command("DuDe  stagefile   a.json b.json ", "DuDe "),
            Some(("stagefile", "a.json b.json"))
        );
    }

    #[test]
    fn other_messages_are_not_commands() {
        assert_eq!(split_command("hello there", "DuDe "), None);
        assert_eq!(split_command("dude liststaged", "DuDe "), None);
        assert_eq!(split_command("DuDe ", "DuDe "), None);
    }
}
