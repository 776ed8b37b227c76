//! Report and reviewer stores
//!
//! Centralized stores for minor reports and the reviewer allowlist. The
//! reviewer registry fronts its store with a single time-threshold cache slot
//! so button interactions do not hit storage on every click.

use crate::minor_report::{MinorReport, ReportError, ReportResult, ReportStatus};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Store for minor reports
#[derive(Clone, Default)]
pub struct ReportStore {
    records: Arc<DashMap<i64, MinorReport>>,
    next_id: Arc<AtomicI64>,
}

/// Result of a flag operation against the store
#[derive(Debug, Clone)]
pub enum FlagOutcome {
    /// A fresh pending report was created
    Created(MinorReport),
    /// An existing pending report was updated in place
    Updated(MinorReport),
}

impl FlagOutcome {
    /// The report involved, regardless of whether it is new.
    #[must_use]
    pub fn report(&self) -> &MinorReport {
        match self {
            Self::Created(report) | Self::Updated(report) => report,
        }
    }
}

impl ReportStore {
    /// Create a new empty report store
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    /// Insert loaded records, advancing the id counter past the highest seen.
    pub fn restore(&self, reports: Vec<MinorReport>) {
        for report in reports {
            let next = self.next_id.load(Ordering::Relaxed).max(report.id + 1);
            self.next_id.store(next, Ordering::Relaxed);
            self.records.insert(report.id, report);
        }
    }

    /// Get a report by id
    #[must_use]
    pub fn get(&self, id: i64) -> Option<MinorReport> {
        self.records.get(&id).map(|entry| entry.value().clone())
    }

    /// The single pending report for a user, if any
    #[must_use]
    pub fn active_for_user(&self, user_id: u64) -> Option<MinorReport> {
        self.records
            .iter()
            .find(|entry| {
                entry.value().user_id == user_id
                    && entry.value().status == ReportStatus::Pending
            })
            .map(|entry| entry.value().clone())
    }

    /// Look a report up by its rendered card's message id
    #[must_use]
    pub fn by_message_id(&self, message_id: u64) -> Option<MinorReport> {
        self.records
            .iter()
            .find(|entry| entry.value().report_message_id == Some(message_id))
            .map(|entry| entry.value().clone())
    }

    /// All reports in any of the given statuses
    #[must_use]
    pub fn by_status(&self, statuses: &[ReportStatus]) -> Vec<MinorReport> {
        self.records
            .iter()
            .filter(|entry| statuses.contains(&entry.value().status))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// All reports
    #[must_use]
    pub fn all(&self) -> Vec<MinorReport> {
        self.records.iter().map(|e| e.value().clone()).collect()
    }

    /// Create a pending report for the user, or update the existing pending
    /// one in place. This is what keeps the "one pending report per user"
    /// invariant: a second flag never creates a second row.
    pub fn create_or_update_pending(
        &self,
        user_id: u64,
        reporter_id: u64,
        suspected_age: u8,
        evidence: &str,
        now: DateTime<Utc>,
    ) -> ReportResult<FlagOutcome> {
        if let Some(existing) = self.active_for_user(user_id) {
            let mut entry = self
                .records
                .get_mut(&existing.id)
                .ok_or_else(|| ReportError::NotFound(existing.id.to_string()))?;
            entry.refresh(reporter_id, suspected_age, evidence, now)?;
            return Ok(FlagOutcome::Updated(entry.clone()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let report = MinorReport::new(id, user_id, reporter_id, suspected_age, evidence, now)?;
        self.records.insert(id, report.clone());
        Ok(FlagOutcome::Created(report))
    }

    /// Bind the rendered card's message id to a report. Stable once set.
    pub fn set_message_id(&self, id: i64, message_id: u64) -> ReportResult<()> {
        let mut entry = self
            .records
            .get_mut(&id)
            .ok_or_else(|| ReportError::NotFound(id.to_string()))?;
        if entry.report_message_id.is_none() {
            entry.report_message_id = Some(message_id);
        }
        Ok(())
    }

    /// Apply a status transition to a stored report and return the new state.
    pub fn update_status(
        &self,
        id: i64,
        status: ReportStatus,
        reviewer_id: u64,
        associated_ban_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> ReportResult<MinorReport> {
        let mut entry = self
            .records
            .get_mut(&id)
            .ok_or_else(|| ReportError::NotFound(id.to_string()))?;
        match status {
            ReportStatus::Approved => {
                let ban_id = associated_ban_id.ok_or_else(|| {
                    ReportError::InvalidStateTransition {
                        from: entry.status,
                        to: status,
                    }
                })?;
                entry.approve(reviewer_id, ban_id, now)?;
            }
            ReportStatus::Denied => entry.deny(reviewer_id, now)?,
            ReportStatus::ConsentVerified => entry.verify_consent(reviewer_id, now)?,
            ReportStatus::Pending => {
                return Err(ReportError::InvalidStateTransition {
                    from: entry.status,
                    to: status,
                });
            }
        }
        Ok(entry.clone())
    }
}

/// Allowlist entry for a minor-report reviewer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reviewer {
    pub user_id: u64,
    pub added_by: Option<u64>,
    pub created_at: DateTime<Utc>,
}

/// Store for the reviewer allowlist, keyed by user id (unique)
#[derive(Clone, Default)]
pub struct ReviewerStore {
    rows: Arc<DashMap<u64, Reviewer>>,
}

impl ReviewerStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rows: Arc::new(DashMap::new()),
        }
    }

    pub fn restore(&self, reviewers: Vec<Reviewer>) {
        for reviewer in reviewers {
            self.rows.insert(reviewer.user_id, reviewer);
        }
    }

    #[must_use]
    pub fn all(&self) -> Vec<Reviewer> {
        self.rows.iter().map(|e| e.value().clone()).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.rows.iter().map(|e| e.value().user_id).collect();
        ids.sort_unstable();
        ids
    }

    fn insert(&self, user_id: u64, added_by: Option<u64>, now: DateTime<Utc>) {
        self.rows.insert(
            user_id,
            Reviewer {
                user_id,
                added_by,
                created_at: now,
            },
        );
    }
}

/// Default reviewer cache TTL
const REVIEWER_CACHE_TTL: Duration = Duration::from_secs(60);

struct CachedIds {
    ids: Arc<[u64]>,
    fetched_at: Instant,
}

/// Reviewer allowlist with a single-slot TTL cache.
///
/// The cache slot is explicitly owned here rather than living in process-wide
/// state; every mutation invalidates it synchronously before returning, so
/// the next read always observes the mutation.
#[derive(Clone)]
pub struct ReviewerRegistry {
    store: ReviewerStore,
    ttl: Duration,
    slot: Arc<Mutex<Option<CachedIds>>>,
}

impl Default for ReviewerRegistry {
    fn default() -> Self {
        Self::new(ReviewerStore::new())
    }
}

impl ReviewerRegistry {
    #[must_use]
    pub fn new(store: ReviewerStore) -> Self {
        Self::with_ttl(store, REVIEWER_CACHE_TTL)
    }

    /// Registry with a custom cache TTL (tests)
    #[must_use]
    pub fn with_ttl(store: ReviewerStore, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Backing store, for persistence
    #[must_use]
    pub fn store(&self) -> &ReviewerStore {
        &self.store
    }

    /// Ordered reviewer ids, served from the cache while it is fresh.
    #[must_use]
    pub fn list_ids(&self) -> Arc<[u64]> {
        let mut slot = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = slot.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return Arc::clone(&cached.ids);
            }
        }

        let ids: Arc<[u64]> = self.store.ids().into();
        *slot = Some(CachedIds {
            ids: Arc::clone(&ids),
            fetched_at: Instant::now(),
        });
        ids
    }

    /// Membership test against the allowlist
    #[must_use]
    pub fn is_reviewer(&self, user_id: u64) -> bool {
        self.list_ids().contains(&user_id)
    }

    /// Drop the cached slot so the next read goes to the store.
    pub fn invalidate(&self) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Add a reviewer. Fails if the user is already on the allowlist.
    pub fn add(&self, user_id: u64, added_by: u64, now: DateTime<Utc>) -> ReportResult<()> {
        if self.store.rows.contains_key(&user_id) {
            return Err(ReportError::AlreadyReviewer(user_id));
        }
        self.store.insert(user_id, Some(added_by), now);
        self.invalidate();
        Ok(())
    }

    /// Remove a reviewer. Fails if the user is not on the allowlist.
    pub fn remove(&self, user_id: u64) -> ReportResult<()> {
        if self.store.rows.remove(&user_id).is_none() {
            return Err(ReportError::NotReviewer(user_id));
        }
        self.invalidate();
        Ok(())
    }

    /// One-time bulk insert of the default reviewer set, only while the
    /// allowlist is empty.
    pub fn seed(
        &self,
        default_ids: &[u64],
        added_by: u64,
        now: DateTime<Utc>,
    ) -> ReportResult<usize> {
        if !self.store.is_empty() {
            return Err(ReportError::AlreadySeeded);
        }
        for &user_id in default_ids {
            self.store.insert(user_id, Some(added_by), now);
        }
        self.invalidate();
        Ok(default_ids.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_pending(user_id: u64) -> (ReportStore, MinorReport) {
        let store = ReportStore::new();
        let outcome = store
            .create_or_update_pending(user_id, 200, 15, "age in bio", Utc::now())
            .unwrap();
        let report = outcome.report().clone();
        (store, report)
    }

    #[test]
    fn test_flag_idempotence_on_active_report() {
        let (store, first) = store_with_pending(100);

        // Second flag against the same user updates the row in place.
        let outcome = store
            .create_or_update_pending(100, 300, 13, "voice chat", Utc::now())
            .unwrap();
        let updated = match outcome {
            FlagOutcome::Updated(report) => report,
            FlagOutcome::Created(_) => panic!("expected update, got a second row"),
        };
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.suspected_age, 13);
        assert_eq!(updated.evidence, "voice chat");
        assert_eq!(updated.reporter_id, 300);
        assert_eq!(store.all().len(), 1);
    }

    #[test]
    fn test_new_flag_after_resolution_creates_new_row() {
        let (store, first) = store_with_pending(100);
        store
            .update_status(first.id, ReportStatus::Denied, 777, None, Utc::now())
            .unwrap();

        let outcome = store
            .create_or_update_pending(100, 300, 14, "new episode", Utc::now())
            .unwrap();
        assert!(matches!(outcome, FlagOutcome::Created(_)));
        assert_eq!(store.all().len(), 2);
    }

    #[test]
    fn test_message_id_binding_is_stable() {
        let (store, report) = store_with_pending(100);
        store.set_message_id(report.id, 9001).unwrap();
        assert_eq!(store.by_message_id(9001).unwrap().id, report.id);

        // A second bind attempt does not move the card reference.
        store.set_message_id(report.id, 9002).unwrap();
        assert!(store.by_message_id(9002).is_none());
        assert_eq!(store.by_message_id(9001).unwrap().id, report.id);
    }

    #[test]
    fn test_update_status_sets_ban_id_only_when_supplied() {
        let (store, report) = store_with_pending(100);
        let approved = store
            .update_status(report.id, ReportStatus::Approved, 777, Some(42), Utc::now())
            .unwrap();
        assert_eq!(approved.associated_ban_id, Some(42));

        // Consent transition passes no ban id; the reference must survive.
        let verified = store
            .update_status(report.id, ReportStatus::ConsentVerified, 888, None, Utc::now())
            .unwrap();
        assert_eq!(verified.associated_ban_id, Some(42));
        assert_eq!(verified.reviewer_id, Some(888));
    }

    #[test]
    fn test_restore_advances_id_counter() {
        let store = ReportStore::new();
        let report = MinorReport::new(7, 100, 200, 15, "evidence", Utc::now()).unwrap();
        store.restore(vec![report]);

        let outcome = store
            .create_or_update_pending(101, 200, 16, "evidence", Utc::now())
            .unwrap();
        assert_eq!(outcome.report().id, 8);
    }

    #[test]
    fn test_reviewer_add_remove_seed() {
        let registry = ReviewerRegistry::new(ReviewerStore::new());
        let now = Utc::now();

        registry.add(1, 999, now).unwrap();
        assert!(matches!(
            registry.add(1, 999, now),
            Err(ReportError::AlreadyReviewer(1))
        ));
        assert!(registry.is_reviewer(1));

        registry.remove(1).unwrap();
        assert!(matches!(
            registry.remove(1),
            Err(ReportError::NotReviewer(1))
        ));

        let seeded = registry.seed(&[10, 20, 30], 999, now).unwrap();
        assert_eq!(seeded, 3);
        assert_eq!(registry.list_ids().as_ref(), &[10, 20, 30]);
        assert!(matches!(
            registry.seed(&[40], 999, now),
            Err(ReportError::AlreadySeeded)
        ));
    }

    #[test]
    fn test_reviewer_cache_serves_stale_reads_within_ttl() {
        let store = ReviewerStore::new();
        let registry = ReviewerRegistry::with_ttl(store.clone(), Duration::from_secs(60));
        registry.add(1, 999, Utc::now()).unwrap();

        let first = registry.list_ids();
        // Mutate the store behind the registry's back: the cached read
        // must not observe it inside the TTL window.
        store.insert(2, None, Utc::now());
        let second = registry.list_ids();
        assert_eq!(first.as_ref(), second.as_ref());
        assert!(!registry.is_reviewer(2));
    }

    #[test]
    fn test_reviewer_cache_invalidate_forces_fresh_read() {
        let store = ReviewerStore::new();
        let registry = ReviewerRegistry::with_ttl(store.clone(), Duration::from_secs(3600));
        registry.add(1, 999, Utc::now()).unwrap();
        let _ = registry.list_ids();

        store.insert(2, None, Utc::now());
        registry.invalidate();
        assert!(registry.is_reviewer(2));
    }

    #[test]
    fn test_reviewer_cache_expires_after_ttl() {
        let store = ReviewerStore::new();
        let registry = ReviewerRegistry::with_ttl(store.clone(), Duration::ZERO);
        registry.add(1, 999, Utc::now()).unwrap();
        let _ = registry.list_ids();

        store.insert(2, None, Utc::now());
        // Zero TTL: every read is a fresh one.
        assert!(registry.is_reviewer(2));
    }
}
