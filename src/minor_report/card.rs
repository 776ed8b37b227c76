//! Report card rendering
//!
//! Builds the embed, action buttons and modals for a minor report in the
//! review channel. The card is a best-effort mirror of the stored report;
//! storage is the source of truth and every transition re-renders from it.

use crate::minor_report::{MinorReport, ReportStatus, age};
use poise::serenity_prelude as serenity;
use serenity::builder::{
    CreateActionRow, CreateButton, CreateEmbed, CreateEmbedFooter, CreateInputText, CreateModal,
};
use serenity::model::application::{ButtonStyle, InputTextStyle};

// Button and modal custom_ids; reports are looked up by card message id.
pub const CUSTOM_ID_APPROVE: &str = "minor_report_approve";
pub const CUSTOM_ID_DENY: &str = "minor_report_deny";
pub const CUSTOM_ID_RECHECK: &str = "minor_report_recheck";
pub const CUSTOM_ID_APPROVE_MODAL: &str = "minor_report_approve_modal";
pub const CUSTOM_ID_DENY_MODAL: &str = "minor_report_deny_modal";

fn status_color(status: ReportStatus) -> u32 {
    match status {
        ReportStatus::Pending => 0x00FF_A500,        // Orange
        ReportStatus::Approved => 0x00FF_2429,       // Red
        ReportStatus::Denied => 0x0000_FF00,         // Green
        ReportStatus::ConsentVerified => 0x0000_99FF, // Blue
    }
}

fn status_heading(status: ReportStatus) -> &'static str {
    match status {
        ReportStatus::Pending => "PENDING",
        ReportStatus::Approved => "APPROVED",
        ReportStatus::Denied => "DENIED",
        ReportStatus::ConsentVerified => "CONSENT VERIFIED",
    }
}

/// Build the embed for a report card
#[must_use]
pub fn build_report_embed(report: &MinorReport, status_notes: Option<&str>) -> CreateEmbed {
    let title = format!("Minor Report #{} - {}", report.id, status_heading(report.status));
    let mut embed = CreateEmbed::new()
        .title(title)
        .color(status_color(report.status))
        .field(
            "User",
            format!("<@{}> ({})", report.user_id, report.user_id),
            false,
        )
        .field("Suspected Age", report.suspected_age.to_string(), true);

    if let Ok(years) = age::years_until_18(report.suspected_age) {
        embed = embed.field(
            "Suggested Ban Duration",
            format!("{years} years (until 18)"),
            true,
        );
    }

    embed = embed
        .field("Evidence", report.evidence.clone(), false)
        .field("Flagged By", format!("<@{}>", report.reporter_id), true)
        .field(
            "Flagged At",
            report.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            true,
        );

    if let Some(notes) = status_notes {
        embed = embed.field("Status Updates", notes.to_string(), false);
    }

    embed.footer(CreateEmbedFooter::new(format!(
        "Report ID: {} | Last updated: {}",
        report.id,
        report.updated_at.format("%Y-%m-%d %H:%M UTC")
    )))
}

fn recheck_button() -> CreateButton {
    CreateButton::new(CUSTOM_ID_RECHECK)
        .label("Recheck Consent")
        .style(ButtonStyle::Primary)
}

/// Action rows for the card. A pending card carries all three actions; an
/// approved card keeps only Recheck, since consent can still arrive and lift
/// the ban. Denied and consent-verified cards carry no controls.
#[must_use]
pub fn report_components(status: ReportStatus) -> Vec<CreateActionRow> {
    let buttons = match status {
        ReportStatus::Pending => vec![
            CreateButton::new(CUSTOM_ID_APPROVE)
                .label("Approve Ban")
                .style(ButtonStyle::Success),
            CreateButton::new(CUSTOM_ID_DENY)
                .label("Deny Report")
                .style(ButtonStyle::Danger),
            recheck_button(),
        ],
        ReportStatus::Approved => vec![recheck_button()],
        ReportStatus::Denied | ReportStatus::ConsentVerified => return Vec::new(),
    };
    vec![CreateActionRow::Buttons(buttons)]
}

/// Duration-entry modal shown when a reviewer approves
#[must_use]
pub fn approve_modal(report: &MinorReport) -> CreateModal {
    let default_duration = age::years_until_18(report.suspected_age)
        .map(|years| format!("{years}y"))
        .unwrap_or_default();
    CreateModal::new(CUSTOM_ID_APPROVE_MODAL, "Approve Ban").components(vec![
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, "Ban duration", "duration")
                .placeholder("e.g. 5y or 3w")
                .value(default_duration)
                .required(true),
        ),
    ])
}

/// Reason-entry modal shown when a reviewer denies
#[must_use]
pub fn deny_modal() -> CreateModal {
    CreateModal::new(CUSTOM_ID_DENY_MODAL, "Deny Report").components(vec![
        CreateActionRow::InputText(
            CreateInputText::new(InputTextStyle::Short, "Reason for denial", "reason")
                .placeholder("Brief reason")
                .required(true),
        ),
    ])
}
