//! Git-like selection of lead files: stage, unstage, list, commit.

use crate::{
    event::*,
    helper::{parse_key_values, MessageHelper},
    log_internal,
    logging::*,
    plugin::*,
    volatile_state::{StageReport, SELECT_ALL},
};
use anyhow::Result;

const DEFAULT_COMMIT_MESSAGE: &str = "No message provided";

pub struct StageFile;
pub struct UnstageFile;
pub struct ListStaged;
pub struct Commit;

#[serenity::async_trait]
impl Plugin for StageFile {
    fn name(&self) -> &'static str {
        "stagefile"
    }

    fn usage(&self, ctx: &Context) -> Option<String> {
        Some(format!(
            "{}{} {} | <file> [file...] - stage all or matching lead files",
            ctx.cfg.general.command_prefix,
            self.name(),
            SELECT_ALL
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()) else {
            return Ok(EventHandled::No);
        };

        let args: Vec<&str> = args.split_whitespace().collect();
        if args.is_empty() {
            let usage = self.usage(ctx).unwrap_or_default();
            msg.reply(ctx.cache_http, format!("Usage: `{}`", usage))
                .await?;
            return Ok(EventHandled::Yes);
        }

        let store = ctx.store.read().await;
        let known = store.files.list().await?;
        let dir = store.files.path().to_string_lossy().into_owned();
        drop(store);

        if known.is_empty() {
            msg.reply(
                ctx.cache_http,
                format!("No JSON files found in the '{}' folder.", dir),
            )
            .await?;
            return Ok(EventHandled::Yes);
        }

        let report = ctx.vstate.write().await.staging.stage(&args, &known);
        log_internal!("Staged {} new file(s)", report.changed);

        msg.reply_long(ctx, &render_stage(&report))
            .await?;
        Ok(EventHandled::Yes)
    }
}

#[serenity::async_trait]
impl Plugin for UnstageFile {
    fn name(&self) -> &'static str {
        "unstagefile"
    }

    fn usage(&self, ctx: &Context) -> Option<String> {
        Some(format!(
            "{}{} {} | <file> [file...] - unstage all or matching lead files",
            ctx.cfg.general.command_prefix,
            self.name(),
            SELECT_ALL
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()) else {
            return Ok(EventHandled::No);
        };

        let args: Vec<&str> = args.split_whitespace().collect();
        let mut vstate = ctx.vstate.write().await;
        if vstate.staging.is_empty() {
            drop(vstate);
            msg.reply(ctx.cache_http, "No files are currently staged.")
                .await?;
            return Ok(EventHandled::Yes);
        }
        if args.is_empty() {
            drop(vstate);
            let usage = self.usage(ctx).unwrap_or_default();
            msg.reply(ctx.cache_http, format!("Usage: `{}`", usage))
                .await?;
            return Ok(EventHandled::Yes);
        }

        let report = vstate.staging.unstage(&args);
        drop(vstate);
        log_internal!("Unstaged {} file(s)", report.changed);

        msg.reply_long(ctx, &render_unstage(&report)).await?;
        Ok(EventHandled::Yes)
    }
}

#[serenity::async_trait]
impl Plugin for ListStaged {
    fn name(&self) -> &'static str {
        "liststaged"
    }

    fn usage(&self, ctx: &Context) -> Option<String> {
        Some(format!(
            "{}{} - list staged lead files",
            ctx.cfg.general.command_prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, _)) = event.is_bot_cmd(ctx, self.name()) else {
            return Ok(EventHandled::No);
        };

        let vstate = ctx.vstate.read().await;
        let staged = vstate.staging.list();
        let reply = if staged.is_empty() {
            "No files are currently staged.".to_owned()
        } else {
            format!(
                "Currently staged files ({}):\n\n{}",
                vstate.staging.len(),
                numbered(staged)
            )
        };
        drop(vstate);

        msg.reply_long(ctx, &reply).await?;
        Ok(EventHandled::Yes)
    }
}

#[serenity::async_trait]
impl Plugin for Commit {
    fn name(&self) -> &'static str {
        "commit"
    }

    fn usage(&self, ctx: &Context) -> Option<String> {
        Some(format!(
            "{}{} message=\"Your message\" - hand off the staged files",
            ctx.cfg.general.command_prefix,
            self.name()
        ))
    }

    async fn handle(&self, ctx: &Context, event: &Event) -> Result<EventHandled> {
        let Some((msg, args)) = event.is_bot_cmd(ctx, self.name()) else {
            return Ok(EventHandled::No);
        };

        let message = parse_key_values(args)
            .remove("message")
            .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_owned());

        let mut vstate = ctx.vstate.write().await;
        if vstate.staging.is_empty() {
            drop(vstate);
            msg.reply(
                ctx.cache_http,
                format!(
                    "No files are staged for commit. Use `{}stagefile` to stage files first.",
                    ctx.cfg.general.command_prefix
                ),
            )
            .await?;
            return Ok(EventHandled::Yes);
        }
        let commit = vstate.staging.commit(message);
        drop(vstate);

        // Nothing processes committed files yet; the commit only hands the list over.
        let files = commit
            .files
            .iter()
            .map(|name| LeadFile(name).color())
            .collect::<Vec<String>>();
        log_internal!(
            "Committed \"{}\": {}",
            commit.message,
            files.join(", ")
        );

        let reply = format!(
            "Committed {} file(s) with message: \"{}\"\nFiles handed off for processing: {}",
            commit.files.len(),
            commit.message,
            commit.files.join(", ")
        );
        msg.reply_long(ctx, &reply).await?;
        Ok(EventHandled::Yes)
    }
}

fn numbered<S: AsRef<str>>(names: impl IntoIterator<Item = S>) -> String {
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| format!("{}. {}\n", i + 1, name.as_ref()))
        .collect()
}

fn render_stage(report: &StageReport) -> String {
    if report.all {
        return format!(
            "Staged all {} files. {} new files added to staging area.",
            report.matched, report.changed
        );
    }

    let mut reply = String::new();
    for (arg, count) in &report.ambiguous {
        reply.push_str(&format!(
            "Multiple files match '{}'. Added {} files to staging area.\n",
            arg, count
        ));
    }
    reply.push_str(&format!("Staged {} file(s).", report.matched));
    if !report.not_found.is_empty() {
        reply.push_str(&format!(
            " Could not find these files: {}",
            report.not_found.join(", ")
        ));
    }
    reply
}

fn render_unstage(report: &StageReport) -> String {
    if report.all {
        return format!(
            "Unstaged all {} files. Staging area is now empty.",
            report.changed
        );
    }

    let mut reply = String::new();
    for (arg, count) in &report.ambiguous {
        reply.push_str(&format!(
            "Multiple files match '{}'. Removed {} files from staging area.\n",
            arg, count
        ));
    }
    reply.push_str(&format!("Unstaged {} file(s).", report.changed));
    if !report.not_found.is_empty() {
        reply.push_str(&format!(
            " Could not find these files in staging area: {}",
            report.not_found.join(", ")
        ));
    }
    reply
}
