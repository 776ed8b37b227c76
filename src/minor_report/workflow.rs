//! Report review workflow
//!
//! Orchestrates the five user-facing transitions over a report: flag,
//! approve, deny, recheck and (via the sweep) expiry. Every operation
//! re-resolves the report from storage by the card's message id; nothing
//! captured at render time is trusted at click time.

use crate::gateway::{GatewayError, GuildGateway};
use crate::minor_report::{
    ConsentVerifier, FlagOutcome, MinorReport, ReportError, ReportResult, ReportStatus,
    ReportStore, ReviewerRegistry, age,
};
use crate::moderation::{AccountLinkStore, Ban, BanStore, NoteStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::warn;

/// Fixed disclosure message attached to bans issued through approval
pub const BAN_DISCLOSURE: &str =
    "Parental consent is missing. Please submit a parental consent form to have this ban lifted.";

/// Consent check seam, mockable in tests
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsentCheck: Send + Sync {
    /// Whether a parental-consent form is on file. Never errors.
    async fn check(&self, account_identifier: &str) -> bool;
}

#[async_trait]
impl ConsentCheck for ConsentVerifier {
    async fn check(&self, account_identifier: &str) -> bool {
        self.check_parental_consent(account_identifier).await
    }
}

/// What a flag operation decided
#[derive(Debug)]
pub enum FlagDecision {
    /// Consent was already on file; no report was created
    ConsentOnFile { role_granted: bool },
    /// A report was created or refreshed
    Flagged(FlagOutcome),
}

/// Result of an approve transition
#[derive(Debug, Clone)]
pub struct ApproveOutcome {
    pub report: MinorReport,
    pub ban: Ban,
    /// Whether the platform ban call succeeded; the ban record stands
    /// either way and a failed call is not retried automatically
    pub ban_applied: bool,
    pub end_epoch: i64,
}

/// Result of a recheck transition
#[derive(Debug, Clone)]
pub enum RecheckOutcome {
    /// No external account is linked to the reported user
    NoLinkedAccount,
    /// Consent still absent; nothing changed
    NoConsent,
    /// Consent found; role granted and matching ban lifted where possible
    ConsentVerified {
        report: MinorReport,
        role_granted: bool,
        unbanned: bool,
    },
}

/// Service orchestrating the report review workflow
#[derive(Clone)]
pub struct ReportService {
    reports: ReportStore,
    reviewers: ReviewerRegistry,
    bans: BanStore,
    notes: NoteStore,
    links: AccountLinkStore,
    consent: Arc<dyn ConsentCheck>,
    gateway: Arc<dyn GuildGateway>,
    guild_id: u64,
    minor_role_id: u64,
}

impl ReportService {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        reports: ReportStore,
        reviewers: ReviewerRegistry,
        bans: BanStore,
        notes: NoteStore,
        links: AccountLinkStore,
        consent: Arc<dyn ConsentCheck>,
        gateway: Arc<dyn GuildGateway>,
        guild_id: u64,
        minor_role_id: u64,
    ) -> Self {
        Self {
            reports,
            reviewers,
            bans,
            notes,
            links,
            consent,
            gateway,
            guild_id,
            minor_role_id,
        }
    }

    /// Reviewer gate shared by approve/deny/recheck. Rejection leaves all
    /// state untouched and performs no platform call.
    fn ensure_reviewer(&self, user_id: u64) -> ReportResult<()> {
        if self.reviewers.is_reviewer(user_id) {
            Ok(())
        } else {
            Err(ReportError::NotAuthorized)
        }
    }

    fn report_by_message(&self, message_id: u64) -> ReportResult<MinorReport> {
        self.reports
            .by_message_id(message_id)
            .ok_or_else(|| ReportError::NotFound(format!("message {message_id}")))
    }

    /// Flag a user as potentially underage.
    ///
    /// When consent is already on file no report is created, only the
    /// protective role is granted. Otherwise a pending report is created,
    /// or the existing pending one refreshed in place.
    pub async fn flag(
        &self,
        target_user_id: u64,
        reporter_id: u64,
        suspected_age: u8,
        evidence: &str,
        now: DateTime<Utc>,
    ) -> ReportResult<FlagDecision> {
        if let Some(account_id) = self.links.account_identifier(target_user_id) {
            if self.consent.check(&account_id).await {
                let role_granted = self.grant_minor_role(target_user_id).await;
                return Ok(FlagDecision::ConsentOnFile { role_granted });
            }
        }

        let outcome = self.reports.create_or_update_pending(
            target_user_id,
            reporter_id,
            suspected_age,
            evidence,
            now,
        )?;
        Ok(FlagDecision::Flagged(outcome))
    }

    /// Bind a freshly posted report card to its report.
    pub fn bind_card(&self, report_id: i64, message_id: u64) -> ReportResult<()> {
        self.reports.set_message_id(report_id, message_id)
    }

    /// Approve a pending report: record and issue the ban, then transition.
    pub async fn approve(
        &self,
        message_id: u64,
        reviewer_id: u64,
        duration_text: &str,
        now: DateTime<Utc>,
    ) -> ReportResult<ApproveOutcome> {
        self.ensure_reviewer(reviewer_id)?;
        let report = self.report_by_message(message_id)?;
        if report.status != ReportStatus::Pending {
            return Err(ReportError::NotPending);
        }

        let end_epoch = age::parse_ban_duration(duration_text, now)?;
        let ban = self
            .bans
            .create(report.user_id, reviewer_id, BAN_DISCLOSURE, end_epoch, now);

        let ban_applied = match self
            .gateway
            .ban(self.guild_id, report.user_id, BAN_DISCLOSURE)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id = %report.user_id, error = %e, "ban call failed");
                false
            }
        };

        let report = self.reports.update_status(
            report.id,
            ReportStatus::Approved,
            reviewer_id,
            Some(ban.id),
            now,
        )?;

        Ok(ApproveOutcome {
            report,
            ban,
            ban_applied,
            end_epoch,
        })
    }

    /// Deny a pending report and append a note to the user's history.
    pub async fn deny(
        &self,
        message_id: u64,
        reviewer_id: u64,
        reason: &str,
        now: DateTime<Utc>,
    ) -> ReportResult<MinorReport> {
        self.ensure_reviewer(reviewer_id)?;
        let report = self.report_by_message(message_id)?;
        if report.status != ReportStatus::Pending {
            return Err(ReportError::NotPending);
        }

        let report =
            self.reports
                .update_status(report.id, ReportStatus::Denied, reviewer_id, None, now)?;
        self.notes.add(
            report.user_id,
            format!("Minor flag denied: {reason}"),
            reviewer_id,
            now.date_naive(),
        );
        Ok(report)
    }

    /// Re-query the consent service for a report's user. With consent on
    /// file the protective role is granted (if still a member), the ban is
    /// lifted only when it is the one this report created, and the report
    /// transitions to consent-verified. Without consent nothing changes.
    pub async fn recheck(
        &self,
        message_id: u64,
        reviewer_id: u64,
        now: DateTime<Utc>,
    ) -> ReportResult<RecheckOutcome> {
        self.ensure_reviewer(reviewer_id)?;
        let report = self.report_by_message(message_id)?;

        let Some(account_id) = self.links.account_identifier(report.user_id) else {
            return Ok(RecheckOutcome::NoLinkedAccount);
        };
        if !self.consent.check(&account_id).await {
            return Ok(RecheckOutcome::NoConsent);
        }

        let is_member = match self.gateway.is_member(self.guild_id, report.user_id).await {
            Ok(is_member) => is_member,
            Err(e) => {
                warn!(user_id = %report.user_id, error = %e, "membership probe failed");
                false
            }
        };
        let role_granted = is_member && self.grant_minor_role(report.user_id).await;

        let unbanned = self.lift_matching_ban(&report).await;

        let report = match report.status {
            ReportStatus::Pending | ReportStatus::Approved => self.reports.update_status(
                report.id,
                ReportStatus::ConsentVerified,
                reviewer_id,
                None,
                now,
            )?,
            // Already terminal; the role/ban reconciliation above is
            // idempotent and the record stays as it is.
            ReportStatus::Denied | ReportStatus::ConsentVerified => report,
        };

        Ok(RecheckOutcome::ConsentVerified {
            report,
            role_granted,
            unbanned,
        })
    }

    /// Lift the user's active ban only when its id matches the one this
    /// report created. Returns whether an unban happened.
    async fn lift_matching_ban(&self, report: &MinorReport) -> bool {
        let Some(associated) = report.associated_ban_id else {
            return false;
        };
        let Some(active) = self.bans.active_for_user(report.user_id) else {
            return false;
        };
        if active.id != associated {
            return false;
        }

        match self.gateway.unban(self.guild_id, report.user_id).await {
            Ok(()) => {
                self.bans.mark_unbanned(active.id);
                true
            }
            // Already lifted on the platform; reconcile the record.
            Err(GatewayError::NotFound(_)) => {
                self.bans.mark_unbanned(active.id);
                true
            }
            Err(e) => {
                warn!(user_id = %report.user_id, error = %e, "unban call failed");
                false
            }
        }
    }

    async fn grant_minor_role(&self, user_id: u64) -> bool {
        match self
            .gateway
            .add_role(self.guild_id, user_id, self.minor_role_id)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "failed to grant protective role");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MockGuildGateway;
    use crate::minor_report::ReviewerStore;
    use crate::moderation::AccountLink;

    const GUILD: u64 = 500;
    const MINOR_ROLE: u64 = 600;
    const REVIEWER: u64 = 777;
    const TARGET: u64 = 100;

    struct Fixture {
        reports: ReportStore,
        reviewers: ReviewerRegistry,
        bans: BanStore,
        notes: NoteStore,
        links: AccountLinkStore,
    }

    impl Fixture {
        fn new() -> Self {
            let reviewers = ReviewerRegistry::new(ReviewerStore::new());
            reviewers.add(REVIEWER, 1, Utc::now()).unwrap();
            Self {
                reports: ReportStore::new(),
                reviewers,
                bans: BanStore::new(),
                notes: NoteStore::new(),
                links: AccountLinkStore::new(),
            }
        }

        fn link_target(&self) {
            self.links.restore(vec![AccountLink {
                discord_user_id: TARGET,
                account_identifier: "sso-uuid-1".to_string(),
            }]);
        }

        fn pending_report(&self) -> MinorReport {
            let outcome = self
                .reports
                .create_or_update_pending(TARGET, 200, 15, "claimed age", Utc::now())
                .unwrap();
            let report = outcome.report().clone();
            self.reports.set_message_id(report.id, 9001).unwrap();
            self.reports.by_message_id(9001).unwrap()
        }

        fn service(
            self,
            consent: MockConsentCheck,
            gateway: MockGuildGateway,
        ) -> ReportService {
            ReportService::new(
                self.reports,
                self.reviewers,
                self.bans,
                self.notes,
                self.links,
                Arc::new(consent),
                Arc::new(gateway),
                GUILD,
                MINOR_ROLE,
            )
        }
    }

    fn consent_returning(result: bool) -> MockConsentCheck {
        let mut consent = MockConsentCheck::new();
        consent.expect_check().returning(move |_| result);
        consent
    }

    #[tokio::test]
    async fn test_flag_with_consent_on_file_skips_report() {
        let fixture = Fixture::new();
        fixture.link_target();
        let reports = fixture.reports.clone();

        let mut gateway = MockGuildGateway::new();
        gateway
            .expect_add_role()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let service = fixture.service(consent_returning(true), gateway);
        let decision = service
            .flag(TARGET, 200, 15, "claimed age", Utc::now())
            .await
            .unwrap();

        assert!(matches!(
            decision,
            FlagDecision::ConsentOnFile { role_granted: true }
        ));
        assert!(reports.all().is_empty());
    }

    #[tokio::test]
    async fn test_flag_without_link_creates_report_directly() {
        let fixture = Fixture::new();
        let reports = fixture.reports.clone();

        // No link, so neither the consent service nor the gateway is called.
        let service = fixture.service(MockConsentCheck::new(), MockGuildGateway::new());
        let decision = service
            .flag(TARGET, 200, 15, "claimed age", Utc::now())
            .await
            .unwrap();

        assert!(matches!(
            decision,
            FlagDecision::Flagged(FlagOutcome::Created(_))
        ));
        assert_eq!(reports.all().len(), 1);
    }

    #[tokio::test]
    async fn test_flag_twice_updates_single_report() {
        let fixture = Fixture::new();
        let reports = fixture.reports.clone();
        let service = fixture.service(MockConsentCheck::new(), MockGuildGateway::new());

        service
            .flag(TARGET, 200, 15, "first", Utc::now())
            .await
            .unwrap();
        let decision = service
            .flag(TARGET, 300, 13, "second", Utc::now())
            .await
            .unwrap();

        assert!(matches!(
            decision,
            FlagDecision::Flagged(FlagOutcome::Updated(_))
        ));
        let all = reports.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].suspected_age, 13);
        assert_eq!(all[0].evidence, "second");
        assert_eq!(all[0].reporter_id, 300);
    }

    #[tokio::test]
    async fn test_approve_transition() {
        let fixture = Fixture::new();
        let report = fixture.pending_report();
        let before = report.updated_at;
        let bans = fixture.bans.clone();

        let mut gateway = MockGuildGateway::new();
        gateway.expect_ban().times(1).returning(|_, _, _| Ok(()));

        let service = fixture.service(MockConsentCheck::new(), gateway);
        let outcome = service
            .approve(9001, REVIEWER, "3y", before + chrono::Duration::seconds(5))
            .await
            .unwrap();

        assert_eq!(outcome.report.status, ReportStatus::Approved);
        assert_eq!(outcome.report.reviewer_id, Some(REVIEWER));
        assert_eq!(outcome.report.associated_ban_id, Some(outcome.ban.id));
        assert!(outcome.report.updated_at > before);
        assert!(outcome.ban_applied);
        assert_eq!(bans.active_for_user(TARGET).unwrap().id, outcome.ban.id);
        assert_eq!(outcome.ban.reason, BAN_DISCLOSURE);
    }

    #[tokio::test]
    async fn test_approve_rejects_bad_duration() {
        let fixture = Fixture::new();
        let report = fixture.pending_report();
        let reports = fixture.reports.clone();

        let service = fixture.service(MockConsentCheck::new(), MockGuildGateway::new());
        let result = service.approve(9001, REVIEWER, "garbage", Utc::now()).await;

        assert!(matches!(result, Err(ReportError::InvalidDuration(_))));
        assert_eq!(reports.get(report.id).unwrap().status, ReportStatus::Pending);
    }

    #[tokio::test]
    async fn test_deny_creates_exactly_one_note() {
        let fixture = Fixture::new();
        fixture.pending_report();
        let notes = fixture.notes.clone();

        let service = fixture.service(MockConsentCheck::new(), MockGuildGateway::new());
        let report = service
            .deny(9001, REVIEWER, "mistaken identity", Utc::now())
            .await
            .unwrap();

        assert_eq!(report.status, ReportStatus::Denied);
        let user_notes = notes.for_user(TARGET);
        assert_eq!(user_notes.len(), 1);
        assert_eq!(user_notes[0].note, "Minor flag denied: mistaken identity");
        assert_eq!(user_notes[0].moderator_id, REVIEWER);
    }

    #[tokio::test]
    async fn test_recheck_with_consent_and_matching_ban() {
        let fixture = Fixture::new();
        fixture.link_target();
        let report = fixture.pending_report();
        let bans = fixture.bans.clone();
        let reports = fixture.reports.clone();

        // Approve first so an associated ban exists.
        let ban = bans.create(TARGET, REVIEWER, BAN_DISCLOSURE, 0, Utc::now());
        reports
            .update_status(report.id, ReportStatus::Approved, REVIEWER, Some(ban.id), Utc::now())
            .unwrap();

        let mut gateway = MockGuildGateway::new();
        gateway.expect_is_member().returning(|_, _| Ok(true));
        gateway
            .expect_add_role()
            .times(1)
            .returning(|_, _, _| Ok(()));
        gateway.expect_unban().times(1).returning(|_, _| Ok(()));

        let service = fixture.service(consent_returning(true), gateway);
        let outcome = service.recheck(9001, REVIEWER, Utc::now()).await.unwrap();

        match outcome {
            RecheckOutcome::ConsentVerified {
                report,
                role_granted,
                unbanned,
            } => {
                assert_eq!(report.status, ReportStatus::ConsentVerified);
                assert!(role_granted);
                assert!(unbanned);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(bans.active_for_user(TARGET).is_none());
    }

    #[tokio::test]
    async fn test_recheck_with_consent_but_no_matching_ban() {
        let fixture = Fixture::new();
        fixture.link_target();
        let report = fixture.pending_report();
        let bans = fixture.bans.clone();
        let reports = fixture.reports.clone();

        // The report references ban 999, but the user's active ban is a
        // different one; it must not be lifted.
        let unrelated = bans.create(TARGET, 1, "unrelated ban", 0, Utc::now());
        reports
            .update_status(report.id, ReportStatus::Approved, REVIEWER, Some(999), Utc::now())
            .unwrap();

        let mut gateway = MockGuildGateway::new();
        gateway.expect_is_member().returning(|_, _| Ok(true));
        gateway
            .expect_add_role()
            .times(1)
            .returning(|_, _, _| Ok(()));
        // No expect_unban: an unban call would panic the mock.

        let service = fixture.service(consent_returning(true), gateway);
        let outcome = service.recheck(9001, REVIEWER, Utc::now()).await.unwrap();

        match outcome {
            RecheckOutcome::ConsentVerified {
                report,
                role_granted,
                unbanned,
            } => {
                assert_eq!(report.status, ReportStatus::ConsentVerified);
                assert!(role_granted);
                assert!(!unbanned);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(bans.active_for_user(TARGET).is_some());
        assert_eq!(bans.get(unrelated.id).map(|b| b.unbanned), Some(false));
    }

    #[tokio::test]
    async fn test_recheck_without_consent_changes_nothing() {
        let fixture = Fixture::new();
        fixture.link_target();
        let report = fixture.pending_report();
        let reports = fixture.reports.clone();

        // Consent absent: no gateway call of any kind.
        let service = fixture.service(consent_returning(false), MockGuildGateway::new());
        let outcome = service.recheck(9001, REVIEWER, Utc::now()).await.unwrap();

        assert!(matches!(outcome, RecheckOutcome::NoConsent));
        let stored = reports.get(report.id).unwrap();
        assert_eq!(stored.status, ReportStatus::Pending);
        assert_eq!(stored.reviewer_id, None);
        assert_eq!(stored.updated_at, report.updated_at);
    }

    #[tokio::test]
    async fn test_recheck_on_denied_report_reconciles_but_stays_denied() {
        let fixture = Fixture::new();
        fixture.link_target();
        let report = fixture.pending_report();
        let reports = fixture.reports.clone();
        reports
            .update_status(report.id, ReportStatus::Denied, REVIEWER, None, Utc::now())
            .unwrap();
        let denied = reports.get(report.id).unwrap();

        // Consent arriving after a denial still grants the role, but the
        // denied record is terminal and keeps its status and timestamps.
        let mut gateway = MockGuildGateway::new();
        gateway.expect_is_member().returning(|_, _| Ok(true));
        gateway
            .expect_add_role()
            .times(1)
            .returning(|_, _, _| Ok(()));

        let service = fixture.service(consent_returning(true), gateway);
        let outcome = service.recheck(9001, REVIEWER, Utc::now()).await.unwrap();

        match outcome {
            RecheckOutcome::ConsentVerified {
                report,
                role_granted,
                unbanned,
            } => {
                assert_eq!(report.status, ReportStatus::Denied);
                assert!(role_granted);
                assert!(!unbanned);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        let stored = reports.get(report.id).unwrap();
        assert_eq!(stored.status, ReportStatus::Denied);
        assert_eq!(stored.updated_at, denied.updated_at);
    }

    #[tokio::test]
    async fn test_reviewer_gate_leaves_everything_untouched() {
        let fixture = Fixture::new();
        let report = fixture.pending_report();
        let reports = fixture.reports.clone();

        // Mocks with no expectations: any platform call panics the test.
        let service = fixture.service(MockConsentCheck::new(), MockGuildGateway::new());
        let intruder = 31337;

        assert!(matches!(
            service.approve(9001, intruder, "3y", Utc::now()).await,
            Err(ReportError::NotAuthorized)
        ));
        assert!(matches!(
            service.deny(9001, intruder, "nope", Utc::now()).await,
            Err(ReportError::NotAuthorized)
        ));
        assert!(matches!(
            service.recheck(9001, intruder, Utc::now()).await,
            Err(ReportError::NotAuthorized)
        ));

        let stored = reports.get(report.id).unwrap();
        assert_eq!(stored.status, ReportStatus::Pending);
        assert_eq!(stored.reviewer_id, None);
        assert_eq!(stored.updated_at, report.updated_at);
    }

    #[tokio::test]
    async fn test_recheck_without_linked_account() {
        let fixture = Fixture::new();
        fixture.pending_report();

        let service = fixture.service(MockConsentCheck::new(), MockGuildGateway::new());
        let outcome = service.recheck(9001, REVIEWER, Utc::now()).await.unwrap();
        assert!(matches!(outcome, RecheckOutcome::NoLinkedAccount));
    }
}
