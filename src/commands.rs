//! Slash commands
//!
//! `/flag_minor` opens (or refreshes) a report and posts its card to the
//! review channel. The `/minor_reviewers` group manages the reviewer
//! allowlist. Validation failures are answered ephemerally instead of being
//! surfaced as framework errors.

use crate::minor_report::{
    FlagDecision, FlagOutcome, MinorReport, age, build_report_embed, report_components,
};
use crate::{Context, Error};
use chrono::Utc;
use poise::command;
use poise::serenity_prelude as serenity;
use serenity::builder::{CreateMessage, EditMessage};
use serenity::model::id::{ChannelId, MessageId};

async fn reply_ephemeral(ctx: Context<'_>, content: impl Into<String>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(content.into())
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Flag a user as a suspected minor for reviewer adjudication
#[command(
    slash_command,
    guild_only,
    default_member_permissions = "MODERATE_MEMBERS"
)]
pub async fn flag_minor(
    ctx: Context<'_>,
    #[description = "User to flag"] user: serenity::User,
    #[description = "Suspected age (1-17)"] suspected_age: i64,
    #[description = "Evidence for the flag"] evidence: String,
) -> Result<(), Error> {
    let data = ctx.data();
    let Some(services) = data.services() else {
        return reply_ephemeral(ctx, "The bot is still starting up; try again shortly.").await;
    };
    let Some(review_channel_id) = data.config.review_channel_id else {
        return reply_ephemeral(ctx, "No review channel is configured; flagging is disabled.")
            .await;
    };

    let suspected_age = match age::validate_suspected_age(suspected_age) {
        Ok(age) => age,
        Err(e) => return reply_ephemeral(ctx, e.to_string()).await,
    };
    if evidence.trim().is_empty() {
        return reply_ephemeral(ctx, "Evidence must not be empty.").await;
    }

    let guild_id = data.config.guild_id;
    let target_id = user.id.get();

    // Only verified users are flaggable, and only once.
    match services
        .gateway
        .member_has_role(guild_id, target_id, data.config.verified_role_id)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            return reply_ephemeral(ctx, "That user has not completed verification.").await;
        }
        Err(e) => return reply_ephemeral(ctx, format!("Could not check the user: {e}")).await,
    }
    if services
        .gateway
        .member_has_role(guild_id, target_id, data.config.minor_role_id)
        .await
        .unwrap_or(false)
    {
        return reply_ephemeral(ctx, "That user is already marked as a minor.").await;
    }

    let decision = services
        .reports
        .flag(
            target_id,
            ctx.author().id.get(),
            suspected_age,
            &evidence,
            Utc::now(),
        )
        .await;
    let decision = match decision {
        Ok(decision) => decision,
        Err(e) => return reply_ephemeral(ctx, format!("Could not flag the user: {e}")).await,
    };

    match decision {
        FlagDecision::ConsentOnFile { role_granted } => {
            let note = if role_granted {
                "Parental consent is already on file; the protective role was applied."
            } else {
                "Parental consent is already on file, but the role could not be applied."
            };
            reply_ephemeral(ctx, note).await
        }
        FlagDecision::Flagged(outcome) => {
            let verb = match &outcome {
                FlagOutcome::Created(_) => "created",
                FlagOutcome::Updated(_) => "updated",
            };
            let report = outcome.report().clone();
            // Storage is the source of truth; a card that failed to render
            // stays stale until the next transition re-renders it.
            let card_rendered = match publish_card(ctx, review_channel_id, &report).await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(error = %e, report_id = %report.id, "Failed to render report card");
                    false
                }
            };
            if let Err(e) = data.save().await {
                tracing::error!(error = %e, "Failed to persist data after flag");
            }
            reply_ephemeral(ctx, flag_reply(report.id, verb, card_rendered)).await
        }
    }
}

/// Confirmation text for a flag. The report row stands even when the card
/// could not be posted.
fn flag_reply(report_id: i64, verb: &str, card_rendered: bool) -> String {
    if card_rendered {
        format!("Report #{report_id} {verb}.")
    } else {
        format!(
            "Report #{report_id} {verb}, but the review card could not be rendered; it will refresh on the next transition."
        )
    }
}

/// Post the report card, or refresh it in place when it already exists.
async fn publish_card(
    ctx: Context<'_>,
    review_channel_id: u64,
    report: &MinorReport,
) -> Result<(), Error> {
    let channel = ChannelId::new(review_channel_id);
    let embed = build_report_embed(report, None);
    let components = report_components(report.status);

    if let Some(message_id) = report.report_message_id {
        let edit = EditMessage::new().embed(embed).components(components);
        channel
            .edit_message(ctx.http(), MessageId::new(message_id), edit)
            .await?;
        return Ok(());
    }

    let message = channel
        .send_message(
            ctx.http(),
            CreateMessage::new().embed(embed).components(components),
        )
        .await?;
    if let Some(services) = ctx.data().services() {
        services.reports.bind_card(report.id, message.id.get())?;
    }
    Ok(())
}

/// Manage the minor-report reviewer allowlist
#[command(
    slash_command,
    guild_only,
    subcommands("add", "remove", "list", "seed"),
    default_member_permissions = "ADMINISTRATOR"
)]
pub async fn minor_reviewers(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Add a user to the reviewer allowlist
#[command(slash_command, guild_only)]
pub async fn add(
    ctx: Context<'_>,
    #[description = "User to add as a reviewer"] user: serenity::User,
) -> Result<(), Error> {
    let data = ctx.data();
    match data
        .reviewers
        .add(user.id.get(), ctx.author().id.get(), Utc::now())
    {
        Ok(()) => {
            if let Err(e) = data.save().await {
                tracing::error!(error = %e, "Failed to persist reviewers");
            }
            reply_ephemeral(ctx, format!("<@{}> is now a reviewer.", user.id.get())).await
        }
        Err(e) => reply_ephemeral(ctx, e.to_string()).await,
    }
}

/// Remove a user from the reviewer allowlist
#[command(slash_command, guild_only)]
pub async fn remove(
    ctx: Context<'_>,
    #[description = "Reviewer to remove"] user: serenity::User,
) -> Result<(), Error> {
    let data = ctx.data();
    match data.reviewers.remove(user.id.get()) {
        Ok(()) => {
            if let Err(e) = data.save().await {
                tracing::error!(error = %e, "Failed to persist reviewers");
            }
            reply_ephemeral(ctx, format!("<@{}> is no longer a reviewer.", user.id.get())).await
        }
        Err(e) => reply_ephemeral(ctx, e.to_string()).await,
    }
}

/// List the current reviewers
#[command(slash_command, guild_only)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let ids = ctx.data().reviewers.list_ids();
    if ids.is_empty() {
        return reply_ephemeral(ctx, "No reviewers are configured.").await;
    }
    let mentions: Vec<String> = ids.iter().map(|id| format!("<@{id}>")).collect();
    reply_ephemeral(ctx, format!("Reviewers: {}", mentions.join(", "))).await
}

/// Seed the allowlist from the configured defaults (only while empty)
#[command(slash_command, guild_only)]
pub async fn seed(ctx: Context<'_>) -> Result<(), Error> {
    let data = ctx.data();
    match data.reviewers.seed(
        &data.config.default_reviewer_ids,
        ctx.author().id.get(),
        Utc::now(),
    ) {
        Ok(count) => {
            if let Err(e) = data.save().await {
                tracing::error!(error = %e, "Failed to persist reviewers");
            }
            reply_ephemeral(ctx, format!("Seeded {count} reviewer(s).")).await
        }
        Err(e) => reply_ephemeral(ctx, e.to_string()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_minor_command_definition() {
        let cmd = flag_minor();
        assert_eq!(cmd.name, "flag_minor");
        assert!(cmd.guild_only);
        assert_eq!(cmd.parameters.len(), 3);
    }

    #[test]
    fn test_flag_reply_notes_card_failure() {
        assert_eq!(flag_reply(7, "created", true), "Report #7 created.");
        let degraded = flag_reply(7, "updated", false);
        assert!(degraded.starts_with("Report #7 updated"));
        assert!(degraded.contains("could not be rendered"));
    }

    #[test]
    fn test_minor_reviewers_subcommands() {
        let cmd = minor_reviewers();
        assert_eq!(cmd.name, "minor_reviewers");
        let names: Vec<&str> = cmd
            .subcommands
            .iter()
            .map(|sub| sub.name.as_str())
            .collect();
        assert_eq!(names, vec!["add", "remove", "list", "seed"]);
    }
}
