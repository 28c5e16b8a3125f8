use crate::{event::*, helper::MessageHelper, plugin::*};
use anyhow::Result;

pub struct Help;

/// Older names for the help command, still answered.
const ALIASES: [&str; 2] = ["help_leads", "help_git"];

impl Help {
    fn answers_to(&self, name: &str) -> bool {
        name == self.name() || ALIASES.contains(&name)
    }
}

#[serenity::async_trait]
impl Plugin for Help {
    fn name(&self) -> &'static str {
        "help"
    }

    fn usage(&self, ctx: &Context) -> Option<String> {
        let prefix = &ctx.cfg.general.command_prefix;
        Some(format!(
            "{}{} (also {}) - show this help message",
            prefix,
            self.name(),
            ALIASES.join(", ")
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, _, _)) = event
            .bot_cmd(ctx)
            .filter(|(_, name, _)| self.answers_to(name))
        else {
            return Ok(EventHandled::No);
        };

        let prefix = &ctx.cfg.general.command_prefix;
        let mut reply = String::new();
        reply.push_str("```\n");
        reply.push_str("Commands:\n");
        for plugin in crate::plugin::plugins() {
            if let Some(usage) = plugin.usage(ctx) {
                reply.push_str(&usage);
                reply.push('\n');
            }
        }
        reply.push_str("\nExamples:\n");
        reply.push_str(&format!(
            "{}addlead company=\"Al Afaq Insurance Brokers\" industry=\"Insurance Brokerage\" \
             business_type=\"Insurance Brokers\" location=\"Dubai, UAE\"\n",
            prefix
        ));
        reply.push_str(&format!("{}showlead al_afaq\n", prefix));
        reply.push_str(&format!("{}stagefile company_name\n", prefix));
        reply.push_str(&format!(
            "{}commit message=\"Add new leads for marketing campaign\"\n",
            prefix
        ));
        reply.push_str("```\n");

        msg.reply_long(ctx, &reply).await?;
        Ok(EventHandled::Yes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn answers_to_its_older_names() {
        assert!(Help.answers_to("help"));
        assert!(Help.answers_to("help_leads"));
        assert!(Help.answers_to("help_git"));
        assert!(!Help.answers_to("helpme"));
        assert!(!Help.answers_to("liststaged"));
    }
}
