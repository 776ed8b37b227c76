//! Moderation records: bans, mutes and user notes
//!
//! Temporary bans and mutes carry an end timestamp and are lifted by the
//! scheduled sweep. Denied minor reports append a note to the user's history.

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// A ban with an end timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ban {
    pub id: i64,
    pub user_id: u64,
    pub moderator_id: u64,
    pub reason: String,
    /// Unix timestamp (seconds) at which the ban should be lifted
    pub unban_time: i64,
    pub unbanned: bool,
    pub created_at: DateTime<Utc>,
}

/// Store for ban records
#[derive(Clone, Default)]
pub struct BanStore {
    records: Arc<DashMap<i64, Ban>>,
    next_id: Arc<AtomicI64>,
}

impl BanStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }

    pub fn restore(&self, bans: Vec<Ban>) {
        for ban in bans {
            let next = self.next_id.load(Ordering::Relaxed).max(ban.id + 1);
            self.next_id.store(next, Ordering::Relaxed);
            self.records.insert(ban.id, ban);
        }
    }

    /// Record a new ban and return it
    pub fn create(
        &self,
        user_id: u64,
        moderator_id: u64,
        reason: impl Into<String>,
        unban_time: i64,
        now: DateTime<Utc>,
    ) -> Ban {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let ban = Ban {
            id,
            user_id,
            moderator_id,
            reason: reason.into(),
            unban_time,
            unbanned: false,
            created_at: now,
        };
        self.records.insert(id, ban.clone());
        ban
    }

    #[must_use]
    pub fn get(&self, id: i64) -> Option<Ban> {
        self.records.get(&id).map(|entry| entry.value().clone())
    }

    /// The user's current un-lifted ban, if any
    #[must_use]
    pub fn active_for_user(&self, user_id: u64) -> Option<Ban> {
        self.records
            .iter()
            .find(|entry| entry.value().user_id == user_id && !entry.value().unbanned)
            .map(|entry| entry.value().clone())
    }

    /// Bans due to be lifted at or before `until_epoch`
    #[must_use]
    pub fn due(&self, until_epoch: i64) -> Vec<Ban> {
        self.records
            .iter()
            .filter(|entry| !entry.value().unbanned && entry.value().unban_time <= until_epoch)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Mark a ban as lifted. Idempotent.
    pub fn mark_unbanned(&self, id: i64) {
        if let Some(mut entry) = self.records.get_mut(&id) {
            entry.unbanned = true;
        }
    }

    #[must_use]
    pub fn all(&self) -> Vec<Ban> {
        self.records.iter().map(|e| e.value().clone()).collect()
    }
}

/// A timed server mute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mute {
    pub user_id: u64,
    /// Unix timestamp (seconds) at which the mute should be lifted
    pub unmute_time: i64,
}

/// Store for mute records, keyed by user id
#[derive(Clone, Default)]
pub struct MuteStore {
    records: Arc<DashMap<u64, Mute>>,
}

impl MuteStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }

    pub fn restore(&self, mutes: Vec<Mute>) {
        for mute in mutes {
            self.records.insert(mute.user_id, mute);
        }
    }

    pub fn upsert(&self, user_id: u64, unmute_time: i64) {
        self.records.insert(
            user_id,
            Mute {
                user_id,
                unmute_time,
            },
        );
    }

    /// Mutes due to be lifted at or before `until_epoch`
    #[must_use]
    pub fn due(&self, until_epoch: i64) -> Vec<Mute> {
        self.records
            .iter()
            .filter(|entry| entry.value().unmute_time <= until_epoch)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Drop a mute once lifted. Idempotent.
    pub fn remove(&self, user_id: u64) {
        self.records.remove(&user_id);
    }

    #[must_use]
    pub fn all(&self) -> Vec<Mute> {
        self.records.iter().map(|e| e.value().clone()).collect()
    }
}

/// A moderation note on a user's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserNote {
    pub user_id: u64,
    pub note: String,
    pub moderator_id: u64,
    pub date: NaiveDate,
}

/// Store for user notes
#[derive(Clone, Default)]
pub struct NoteStore {
    records: Arc<DashMap<u64, Vec<UserNote>>>,
}

impl NoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }

    pub fn restore(&self, notes: Vec<UserNote>) {
        for note in notes {
            self.records.entry(note.user_id).or_default().push(note);
        }
    }

    pub fn add(&self, user_id: u64, note: impl Into<String>, moderator_id: u64, date: NaiveDate) {
        self.records.entry(user_id).or_default().push(UserNote {
            user_id,
            note: note.into(),
            moderator_id,
            date,
        });
    }

    #[must_use]
    pub fn for_user(&self, user_id: u64) -> Vec<UserNote> {
        self.records
            .get(&user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn all(&self) -> Vec<UserNote> {
        self.records
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }
}

/// Account links between Discord users and the external platform.
/// Populated by the verification flow; read-only for this bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountLink {
    pub discord_user_id: u64,
    /// External account identifier used by the consent attestation service
    pub account_identifier: String,
}

/// Store for account links, keyed by Discord user id
#[derive(Clone, Default)]
pub struct AccountLinkStore {
    records: Arc<DashMap<u64, AccountLink>>,
}

impl AccountLinkStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }

    pub fn restore(&self, links: Vec<AccountLink>) {
        for link in links {
            self.records.insert(link.discord_user_id, link);
        }
    }

    /// External account identifier for a Discord user, if linked
    #[must_use]
    pub fn account_identifier(&self, discord_user_id: u64) -> Option<String> {
        self.records
            .get(&discord_user_id)
            .map(|entry| entry.value().account_identifier.clone())
    }

    #[must_use]
    pub fn all(&self) -> Vec<AccountLink> {
        self.records.iter().map(|e| e.value().clone()).collect()
    }
}
