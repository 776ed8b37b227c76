//! Centralized bot state
//!
//! All stores live behind one `Data` handle shared between commands, event
//! handlers and the sweep task. Services that need the Discord HTTP client
//! are wired in once during framework setup.

use std::{
    ops::Deref,
    sync::{Arc, OnceLock},
};

use crate::config::BotConfig;
use crate::gateway::GuildGateway;
use crate::minor_report::{
    ConsentVerifier, MinorReport, ReportService, ReportStore, Reviewer, ReviewerRegistry,
    ReviewerStore, SweepRequest, SweepService,
};
use crate::moderation::{AccountLink, AccountLinkStore, Ban, BanStore, Mute, MuteStore, NoteStore, UserNote};
use poise::serenity_prelude as serenity;
use serenity::prelude::TypeMapKey;
use tokio::sync::mpsc::Sender;
use tracing::warn;

const DATA_DIR: &str = "data";
const REPORTS_FILE: &str = "data/reports.yaml";
const REVIEWERS_FILE: &str = "data/reviewers.yaml";
const BANS_FILE: &str = "data/bans.yaml";
const MUTES_FILE: &str = "data/mutes.yaml";
const NOTES_FILE: &str = "data/notes.yaml";
const ACCOUNT_LINKS_FILE: &str = "data/account_links.yaml";

/// Services that require the Discord HTTP client, wired in at setup
#[derive(Clone)]
pub struct Services {
    pub reports: ReportService,
    pub sweep: SweepService,
    pub sweep_tx: Sender<SweepRequest>,
    pub gateway: Arc<dyn GuildGateway>,
}

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data").finish_non_exhaustive()
    }
}

impl TypeMapKey for Data {
    type Value = Data;
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Create a new Data instance around a configuration
    #[must_use]
    pub fn new(config: BotConfig) -> Self {
        Self(Arc::new(DataInner::new(config)))
    }

    /// Load configuration and persisted records from YAML files
    pub async fn load() -> Self {
        Self(Arc::new(DataInner::load().await))
    }

    /// Save all records to YAML files
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created, a store
    /// cannot be serialized, or a file cannot be written.
    pub async fn save(&self) -> Result<(), crate::Error> {
        self.0.save().await
    }

    /// Wire in the HTTP-backed services. Effective only on the first call.
    pub fn set_services(&self, services: Services) {
        if self.0.services.set(services).is_err() {
            warn!("Services already set; ignoring");
        }
    }

    /// The wired services, absent until framework setup completes
    #[must_use]
    pub fn services(&self) -> Option<&Services> {
        self.0.services.get()
    }
}

/// Inner state shared through `Data`
pub struct DataInner {
    pub config: BotConfig,
    pub reports: ReportStore,
    pub reviewers: ReviewerRegistry,
    pub bans: BanStore,
    pub mutes: MuteStore,
    pub notes: NoteStore,
    pub links: AccountLinkStore,
    pub consent: ConsentVerifier,
    services: OnceLock<Services>,
}

impl DataInner {
    #[must_use]
    pub fn new(config: BotConfig) -> Self {
        let consent = ConsentVerifier::new(
            config.consent_check_url.clone(),
            config.consent_check_secret.clone(),
        );
        Self {
            config,
            reports: ReportStore::new(),
            reviewers: ReviewerRegistry::new(ReviewerStore::new()),
            bans: BanStore::new(),
            mutes: MuteStore::new(),
            notes: NoteStore::new(),
            links: AccountLinkStore::new(),
            consent,
            services: OnceLock::new(),
        }
    }

    /// Load configuration and every persisted store. A missing or
    /// malformed file leaves the corresponding store empty.
    pub async fn load() -> Self {
        let config = BotConfig::load().await;
        let data = Self::new(config);

        if let Some(reports) = read_yaml::<MinorReport>(REPORTS_FILE).await {
            data.reports.restore(reports);
        }
        if let Some(reviewers) = read_yaml::<Reviewer>(REVIEWERS_FILE).await {
            data.reviewers.store().restore(reviewers);
        }
        if let Some(bans) = read_yaml::<Ban>(BANS_FILE).await {
            data.bans.restore(bans);
        }
        if let Some(mutes) = read_yaml::<Mute>(MUTES_FILE).await {
            data.mutes.restore(mutes);
        }
        if let Some(notes) = read_yaml::<UserNote>(NOTES_FILE).await {
            data.notes.restore(notes);
        }
        if let Some(links) = read_yaml::<AccountLink>(ACCOUNT_LINKS_FILE).await {
            data.links.restore(links);
        }

        data
    }

    /// Save every store to its YAML file.
    pub async fn save(&self) -> Result<(), crate::Error> {
        if !std::path::Path::new(DATA_DIR).exists() {
            tokio::fs::create_dir_all(DATA_DIR).await?;
        }

        write_yaml(REPORTS_FILE, &self.reports.all()).await?;
        write_yaml(REVIEWERS_FILE, &self.reviewers.store().all()).await?;
        write_yaml(BANS_FILE, &self.bans.all()).await?;
        write_yaml(MUTES_FILE, &self.mutes.all()).await?;
        write_yaml(NOTES_FILE, &self.notes.all()).await?;
        write_yaml(ACCOUNT_LINKS_FILE, &self.links.all()).await?;

        Ok(())
    }
}

async fn read_yaml<T: serde::de::DeserializeOwned>(path: &str) -> Option<Vec<T>> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    match serde_yaml::from_str::<Vec<T>>(&content) {
        Ok(records) => Some(records),
        Err(e) => {
            warn!("Failed to parse {path}: {e}");
            None
        }
    }
}

async fn write_yaml<T: serde::Serialize>(path: &str, records: &[T]) -> Result<(), crate::Error> {
    let yaml = serde_yaml::to_string(records)?;
    tokio::fs::write(path, yaml).await?;
    Ok(())
}
