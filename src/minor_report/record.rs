//! Minor report record and status state machine
//!
//! One record per flagged user per flagging episode. Transitions are
//! `Pending -> {Approved, Denied, ConsentVerified}` and
//! `Approved -> ConsentVerified`; `Denied` and `ConsentVerified` are terminal
//! for the record itself (expiry is driven by the sweep, not a status).

use crate::minor_report::{ReportError, ReportResult, age};
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Review status of a minor report
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    /// Awaiting reviewer adjudication
    #[default]
    #[display("pending")]
    Pending,
    /// Reviewer approved; user banned pending parental consent
    #[display("approved")]
    Approved,
    /// Reviewer denied the flag
    #[display("denied")]
    Denied,
    /// Parental consent confirmed
    #[display("consent_verified")]
    ConsentVerified,
}

/// A minor flag report under review by designated moderators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinorReport {
    /// Surrogate id, allocated by the store
    pub id: i64,
    /// Discord user id of the reported user (immutable after creation)
    pub user_id: u64,
    /// Discord user id of the flagging moderator
    pub reporter_id: u64,
    /// Suspected age, always 1-17
    pub suspected_age: u8,
    /// Free-text justification for the flag
    pub evidence: String,
    /// Message id of the rendered report card in the review channel;
    /// stable once set, the sole lookup key from interactions
    pub report_message_id: Option<u64>,
    /// Current review status
    pub status: ReportStatus,
    /// Reviewer who last transitioned the status
    pub reviewer_id: Option<u64>,
    /// Creation time; anchors the age-out computation and never changes
    pub created_at: DateTime<Utc>,
    /// Bumped on every status transition
    pub updated_at: DateTime<Utc>,
    /// Ban record created on approval, set at most once
    pub associated_ban_id: Option<i64>,
}

impl MinorReport {
    /// Create a new pending report. Validates the suspected age and evidence.
    pub fn new(
        id: i64,
        user_id: u64,
        reporter_id: u64,
        suspected_age: u8,
        evidence: impl Into<String>,
        now: DateTime<Utc>,
    ) -> ReportResult<Self> {
        age::years_until_18(suspected_age)?;
        let evidence = evidence.into();
        if evidence.trim().is_empty() {
            return Err(ReportError::EmptyEvidence);
        }

        Ok(Self {
            id,
            user_id,
            reporter_id,
            suspected_age,
            evidence,
            report_message_id: None,
            status: ReportStatus::Pending,
            reviewer_id: None,
            created_at: now,
            updated_at: now,
            associated_ban_id: None,
        })
    }

    /// Overwrite flag details on a re-flag while still pending.
    pub fn refresh(
        &mut self,
        reporter_id: u64,
        suspected_age: u8,
        evidence: impl Into<String>,
        now: DateTime<Utc>,
    ) -> ReportResult<()> {
        if self.status != ReportStatus::Pending {
            return Err(ReportError::NotPending);
        }
        age::years_until_18(suspected_age)?;
        let evidence = evidence.into();
        if evidence.trim().is_empty() {
            return Err(ReportError::EmptyEvidence);
        }

        self.reporter_id = reporter_id;
        self.suspected_age = suspected_age;
        self.evidence = evidence;
        self.updated_at = now;
        Ok(())
    }

    /// Approve this report, recording the reviewer and the resulting ban.
    ///
    /// # Errors
    /// Returns an error if the report is not pending.
    pub fn approve(
        &mut self,
        reviewer_id: u64,
        ban_id: i64,
        now: DateTime<Utc>,
    ) -> ReportResult<()> {
        self.transition(ReportStatus::Approved, reviewer_id, now)?;
        self.associated_ban_id = Some(ban_id);
        Ok(())
    }

    /// Deny this report.
    ///
    /// # Errors
    /// Returns an error if the report is not pending.
    pub fn deny(&mut self, reviewer_id: u64, now: DateTime<Utc>) -> ReportResult<()> {
        self.transition(ReportStatus::Denied, reviewer_id, now)
    }

    /// Mark parental consent as verified. Reachable from pending or approved.
    ///
    /// # Errors
    /// Returns an error from denied or already-verified reports.
    pub fn verify_consent(&mut self, reviewer_id: u64, now: DateTime<Utc>) -> ReportResult<()> {
        self.transition(ReportStatus::ConsentVerified, reviewer_id, now)
    }

    fn transition(
        &mut self,
        to: ReportStatus,
        reviewer_id: u64,
        now: DateTime<Utc>,
    ) -> ReportResult<()> {
        let allowed = match (self.status, to) {
            (ReportStatus::Pending, ReportStatus::Approved | ReportStatus::Denied) => true,
            (
                ReportStatus::Pending | ReportStatus::Approved,
                ReportStatus::ConsentVerified,
            ) => true,
            _ => false,
        };
        if !allowed {
            return Err(ReportError::InvalidStateTransition {
                from: self.status,
                to,
            });
        }

        self.status = to;
        self.reviewer_id = Some(reviewer_id);
        self.updated_at = now;

        info!(
            report_id = %self.id,
            user_id = %self.user_id,
            reviewer_id = %reviewer_id,
            status = %to,
            "Minor report status transition"
        );

        Ok(())
    }

    /// Instant at which the protective role should be removed.
    pub fn expiry_instant(&self) -> ReportResult<DateTime<Utc>> {
        age::expiry_instant(self.created_at, self.suspected_age)
    }

    /// Whether the reported user has aged past 18 as of `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry_instant().is_ok_and(|expiry| now >= expiry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn pending_report() -> MinorReport {
        MinorReport::new(1, 100, 200, 15, "claimed to be 15 in chat", Utc::now()).unwrap()
    }

    #[test]
    fn test_new_validates_inputs() {
        let now = Utc::now();
        assert!(matches!(
            MinorReport::new(1, 100, 200, 18, "evidence", now),
            Err(ReportError::InvalidAge(_))
        ));
        assert!(matches!(
            MinorReport::new(1, 100, 200, 15, "   ", now),
            Err(ReportError::EmptyEvidence)
        ));
    }

    #[test]
    fn test_approve_transition() {
        let mut report = pending_report();
        let before = report.updated_at;

        report
            .approve(777, 42, before + Duration::seconds(5))
            .unwrap();
        assert_eq!(report.status, ReportStatus::Approved);
        assert_eq!(report.reviewer_id, Some(777));
        assert_eq!(report.associated_ban_id, Some(42));
        assert!(report.updated_at > before);

        // Approved reports cannot be approved or denied again.
        assert!(report.approve(777, 43, Utc::now()).is_err());
        assert!(report.deny(777, Utc::now()).is_err());
    }

    #[test]
    fn test_deny_is_terminal() {
        let mut report = pending_report();
        report.deny(777, Utc::now()).unwrap();
        assert_eq!(report.status, ReportStatus::Denied);
        assert!(report.verify_consent(777, Utc::now()).is_err());
    }

    #[test]
    fn test_consent_reachable_from_pending_and_approved() {
        let mut report = pending_report();
        report.verify_consent(777, Utc::now()).unwrap();
        assert_eq!(report.status, ReportStatus::ConsentVerified);

        let mut report = pending_report();
        report.approve(777, 42, Utc::now()).unwrap();
        report.verify_consent(888, Utc::now()).unwrap();
        assert_eq!(report.status, ReportStatus::ConsentVerified);
        assert_eq!(report.reviewer_id, Some(888));
        // Approval's ban reference survives the consent transition.
        assert_eq!(report.associated_ban_id, Some(42));

        // Terminal once verified.
        assert!(report.verify_consent(999, Utc::now()).is_err());
    }

    #[test]
    fn test_refresh_only_while_pending() {
        let mut report = pending_report();
        let later = report.created_at + Duration::minutes(10);
        report.refresh(300, 14, "new evidence", later).unwrap();
        assert_eq!(report.reporter_id, 300);
        assert_eq!(report.suspected_age, 14);
        assert_eq!(report.evidence, "new evidence");
        assert_eq!(report.updated_at, later);

        report.deny(777, Utc::now()).unwrap();
        assert!(matches!(
            report.refresh(300, 13, "more", Utc::now()),
            Err(ReportError::NotPending)
        ));
    }

    #[test]
    fn test_expiry() {
        let created = Utc::now() - Duration::days(365 * 3);
        let mut report = pending_report();
        report.created_at = created;
        report.suspected_age = 15; // 3 years until 18, so expired right about now
        assert!(report.is_expired(Utc::now() + Duration::seconds(1)));

        report.suspected_age = 14; // one more year to go
        assert!(!report.is_expired(Utc::now()));
    }

    #[test]
    fn test_status_serialization() {
        let report = pending_report();
        let yaml = serde_yaml::to_string(&report).expect("Failed to serialize");
        assert!(yaml.contains("status: pending"));
        assert!(yaml.contains("user_id: 100"));

        let parsed: MinorReport = serde_yaml::from_str(&yaml).expect("Failed to deserialize");
        assert_eq!(parsed.status, ReportStatus::Pending);
        assert_eq!(parsed.suspected_age, 15);
    }
}
