//! Serenity and poise event handlers
//!
//! The serenity `Handler` covers connection lifecycle events. Poise's event
//! callback routes report-card button clicks and modal submissions into the
//! report service, and re-grants the protective role on rejoin. Interaction
//! failures are logged and answered ephemerally; they never take the event
//! loop down.

use crate::minor_report::{
    CUSTOM_ID_APPROVE, CUSTOM_ID_APPROVE_MODAL, CUSTOM_ID_DENY, CUSTOM_ID_DENY_MODAL,
    CUSTOM_ID_RECHECK, RecheckOutcome, ReportStatus, approve_modal, build_report_embed,
    deny_modal, report_components,
};
use crate::{Data, EVENT_TARGET, Error};
use chrono::Utc;
use poise::serenity_prelude::{self as serenity, Context, EventHandler, FullEvent, GuildId, Ready};
use serenity::builder::{CreateInteractionResponse, CreateInteractionResponseMessage};
use serenity::model::application::{
    ActionRowComponent, ComponentInteraction, Interaction, ModalInteraction,
};
use tracing::{error, info, warn};

pub struct Handler;

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        let user_name = ready.user.name.clone();
        let shard_id = ctx.shard_id;
        info!(target: EVENT_TARGET, "Connected as {user_name}, shard {shard_id}");
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                target: EVENT_TARGET,
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!(target: EVENT_TARGET, "Cache ready! The bot is in {guild_count} guild(s)");
    }
}

/// Poise event callback wired into the framework options.
pub async fn handle_event(
    ctx: &Context,
    event: &FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        FullEvent::InteractionCreate {
            interaction: Interaction::Component(component),
        } => {
            handle_component(ctx, component, data).await;
        }
        FullEvent::InteractionCreate {
            interaction: Interaction::Modal(modal),
        } => {
            handle_modal(ctx, modal, data).await;
        }
        FullEvent::GuildMemberAddition { new_member } => {
            if new_member.guild_id.get() == data.config.guild_id {
                if let Some(services) = data.services() {
                    services
                        .sweep
                        .handle_member_join(new_member.user.id.get(), Utc::now())
                        .await;
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Report-card button clicks. The card message id is the sole lookup key;
/// the report is re-read from storage on every click.
async fn handle_component(ctx: &Context, component: &ComponentInteraction, data: &Data) {
    let custom_id = component.data.custom_id.as_str();
    if !matches!(
        custom_id,
        CUSTOM_ID_APPROVE | CUSTOM_ID_DENY | CUSTOM_ID_RECHECK
    ) {
        return;
    }

    let message_id = component.message.id.get();
    let user_id = component.user.id.get();

    if !data.reviewers.is_reviewer(user_id) {
        respond_component(
            ctx,
            component,
            ephemeral("Only minor-report reviewers can use these buttons."),
        )
        .await;
        return;
    }

    let Some(report) = data.reports.by_message_id(message_id) else {
        respond_component(
            ctx,
            component,
            ephemeral("No report is associated with this message."),
        )
        .await;
        return;
    };

    match custom_id {
        CUSTOM_ID_APPROVE | CUSTOM_ID_DENY => {
            if report.status != ReportStatus::Pending {
                respond_component(
                    ctx,
                    component,
                    ephemeral("This report has already been resolved."),
                )
                .await;
                return;
            }
            let modal = if custom_id == CUSTOM_ID_APPROVE {
                approve_modal(&report)
            } else {
                deny_modal()
            };
            respond_component(ctx, component, CreateInteractionResponse::Modal(modal)).await;
        }
        CUSTOM_ID_RECHECK => {
            let Some(services) = data.services() else {
                warn!(target: EVENT_TARGET, "Recheck before services were wired");
                return;
            };
            match services.reports.recheck(message_id, user_id, Utc::now()).await {
                Ok(outcome) => {
                    let note = match &outcome {
                        RecheckOutcome::NoLinkedAccount => {
                            "Recheck: no linked account, consent cannot be verified.".to_string()
                        }
                        RecheckOutcome::NoConsent => {
                            "Recheck: parental consent is still not on file.".to_string()
                        }
                        RecheckOutcome::ConsentVerified {
                            role_granted,
                            unbanned,
                            ..
                        } => format!(
                            "Consent verified. Role granted: {role_granted}. Unbanned: {unbanned}."
                        ),
                    };
                    save_data(data).await;
                    respond_with_card(ctx, component, data, message_id, &note).await;
                }
                Err(e) => {
                    warn!(target: EVENT_TARGET, error = %e, "Recheck failed");
                    respond_component(ctx, component, ephemeral(&format!("Recheck failed: {e}")))
                        .await;
                }
            }
        }
        _ => {}
    }
}

/// Modal submissions from the approve/deny buttons.
async fn handle_modal(ctx: &Context, modal: &ModalInteraction, data: &Data) {
    let custom_id = modal.data.custom_id.as_str();
    if !matches!(custom_id, CUSTOM_ID_APPROVE_MODAL | CUSTOM_ID_DENY_MODAL) {
        return;
    }

    let Some(message) = modal.message.as_deref() else {
        warn!(target: EVENT_TARGET, "Modal submitted without a source message");
        return;
    };
    let message_id = message.id.get();
    let user_id = modal.user.id.get();

    let Some(services) = data.services() else {
        warn!(target: EVENT_TARGET, "Modal submitted before services were wired");
        return;
    };

    match custom_id {
        CUSTOM_ID_APPROVE_MODAL => {
            let duration = modal_input(modal, "duration").unwrap_or_default();
            match services
                .reports
                .approve(message_id, user_id, &duration, Utc::now())
                .await
            {
                Ok(outcome) => {
                    let mut note = format!("Banned until <t:{}:F>.", outcome.end_epoch);
                    if !outcome.ban_applied {
                        note.push_str(" Platform ban failed and needs manual attention.");
                    }
                    save_data(data).await;
                    respond_modal_with_card(ctx, modal, data, message_id, &note).await;
                }
                Err(e) => {
                    warn!(target: EVENT_TARGET, error = %e, "Approve failed");
                    respond_modal(ctx, modal, ephemeral(&format!("Approve failed: {e}"))).await;
                }
            }
        }
        CUSTOM_ID_DENY_MODAL => {
            let reason = modal_input(modal, "reason").unwrap_or_default();
            match services
                .reports
                .deny(message_id, user_id, &reason, Utc::now())
                .await
            {
                Ok(_) => {
                    save_data(data).await;
                    respond_modal_with_card(ctx, modal, data, message_id, "Report denied.").await;
                }
                Err(e) => {
                    warn!(target: EVENT_TARGET, error = %e, "Deny failed");
                    respond_modal(ctx, modal, ephemeral(&format!("Deny failed: {e}"))).await;
                }
            }
        }
        _ => {}
    }
}

/// First input-text value with the given custom id, if present
fn modal_input(modal: &ModalInteraction, custom_id: &str) -> Option<String> {
    for row in &modal.data.components {
        for component in &row.components {
            if let ActionRowComponent::InputText(input) = component {
                if input.custom_id == custom_id {
                    return input.value.clone();
                }
            }
        }
    }
    None
}

fn ephemeral(content: &str) -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(content.to_string())
            .ephemeral(true),
    )
}

/// Re-render the card from storage as the interaction response.
fn card_update(data: &Data, message_id: u64, note: &str) -> Option<CreateInteractionResponse> {
    let report = data.reports.by_message_id(message_id)?;
    Some(CreateInteractionResponse::UpdateMessage(
        CreateInteractionResponseMessage::new()
            .embed(build_report_embed(&report, Some(note)))
            .components(report_components(report.status)),
    ))
}

async fn respond_with_card(
    ctx: &Context,
    component: &ComponentInteraction,
    data: &Data,
    message_id: u64,
    note: &str,
) {
    match card_update(data, message_id, note) {
        Some(response) => respond_component(ctx, component, response).await,
        None => respond_component(ctx, component, ephemeral(note)).await,
    }
}

async fn respond_modal_with_card(
    ctx: &Context,
    modal: &ModalInteraction,
    data: &Data,
    message_id: u64,
    note: &str,
) {
    match card_update(data, message_id, note) {
        Some(response) => respond_modal(ctx, modal, response).await,
        None => respond_modal(ctx, modal, ephemeral(note)).await,
    }
}

async fn respond_component(
    ctx: &Context,
    component: &ComponentInteraction,
    response: CreateInteractionResponse,
) {
    if let Err(e) = component.create_response(&ctx.http, response).await {
        error!(target: EVENT_TARGET, error = %e, "Failed to respond to component interaction");
    }
}

async fn respond_modal(ctx: &Context, modal: &ModalInteraction, response: CreateInteractionResponse) {
    if let Err(e) = modal.create_response(&ctx.http, response).await {
        error!(target: EVENT_TARGET, error = %e, "Failed to respond to modal interaction");
    }
}

async fn save_data(data: &Data) {
    if let Err(e) = data.save().await {
        error!(target: EVENT_TARGET, error = %e, "Failed to persist data");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_implements_event_handler() {
        fn assert_impl<T: EventHandler>() {}
        assert_impl::<Handler>();
    }

    #[test]
    fn test_card_update_requires_known_message() {
        let data = Data::new(crate::BotConfig::default());
        assert!(card_update(&data, 9001, "note").is_none());

        let outcome = data
            .reports
            .create_or_update_pending(100, 200, 15, "evidence", Utc::now())
            .unwrap();
        data.reports.set_message_id(outcome.report().id, 9001).unwrap();
        assert!(card_update(&data, 9001, "note").is_some());
    }
}
