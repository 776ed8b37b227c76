//! Scheduled reconciliation sweep
//!
//! One task owns the periodic cycle that lifts expired bans and mutes and
//! removes the protective role once a reported user ages past 18. The cycle
//! runs from a single loop, so overlapping runs cannot double-apply an
//! action, and every per-item failure is logged and skipped rather than
//! aborting the rest of the cycle.

use crate::gateway::{GatewayError, GuildGateway};
use crate::minor_report::{ReportStatus, ReportStore, SweepRequest};
use crate::moderation::{BanStore, MuteStore};
use crate::SWEEP_TARGET;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Counts of actions taken by one sweep cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub unbanned: usize,
    pub unmuted: usize,
    pub roles_removed: usize,
}

/// Periodic reconciliation over bans, mutes and protective roles
#[derive(Clone)]
pub struct SweepService {
    reports: ReportStore,
    bans: BanStore,
    mutes: MuteStore,
    gateway: Arc<dyn GuildGateway>,
    guild_id: u64,
    minor_role_id: u64,
    muted_role_id: u64,
}

impl SweepService {
    #[must_use]
    pub fn new(
        reports: ReportStore,
        bans: BanStore,
        mutes: MuteStore,
        gateway: Arc<dyn GuildGateway>,
        guild_id: u64,
        minor_role_id: u64,
        muted_role_id: u64,
    ) -> Self {
        Self {
            reports,
            bans,
            mutes,
            gateway,
            guild_id,
            minor_role_id,
            muted_role_id,
        }
    }

    /// Run one full sweep cycle.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> SweepStats {
        let stats = SweepStats {
            unbanned: self.sweep_bans(now).await,
            unmuted: self.sweep_mutes(now).await,
            roles_removed: self.sweep_minor_roles(now).await,
        };
        if stats != SweepStats::default() {
            info!(
                target: SWEEP_TARGET,
                unbanned = stats.unbanned,
                unmuted = stats.unmuted,
                roles_removed = stats.roles_removed,
                "Sweep cycle applied actions"
            );
        }
        stats
    }

    /// Lift bans whose end time has passed. A ban due between two ticks
    /// waits for the later one rather than being lifted early.
    async fn sweep_bans(&self, now: DateTime<Utc>) -> usize {
        let mut lifted = 0;
        for ban in self.bans.due(now.timestamp()) {
            match self.gateway.unban(self.guild_id, ban.user_id).await {
                // Already absent on the platform counts as lifted.
                Ok(()) | Err(GatewayError::NotFound(_)) => {
                    self.bans.mark_unbanned(ban.id);
                    lifted += 1;
                    debug!(
                        target: SWEEP_TARGET,
                        user_id = %ban.user_id,
                        ban_id = %ban.id,
                        "Ban lifted"
                    );
                }
                Err(e) => {
                    warn!(
                        target: SWEEP_TARGET,
                        user_id = %ban.user_id,
                        ban_id = %ban.id,
                        error = %e,
                        "Failed to lift ban; will retry next cycle"
                    );
                }
            }
        }
        lifted
    }

    /// Remove the muted role from users whose mute has run out.
    async fn sweep_mutes(&self, now: DateTime<Utc>) -> usize {
        let mut lifted = 0;
        for mute in self.mutes.due(now.timestamp()) {
            match self
                .gateway
                .remove_role(self.guild_id, mute.user_id, self.muted_role_id)
                .await
            {
                // A user who left the guild is unmuted by definition.
                Ok(()) | Err(GatewayError::NotFound(_)) => {
                    self.mutes.remove(mute.user_id);
                    lifted += 1;
                }
                Err(e) => {
                    warn!(
                        target: SWEEP_TARGET,
                        user_id = %mute.user_id,
                        error = %e,
                        "Failed to lift mute; will retry next cycle"
                    );
                }
            }
        }
        lifted
    }

    /// Remove the protective role from users who have aged past 18.
    async fn sweep_minor_roles(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        let candidates = self
            .reports
            .by_status(&[ReportStatus::Approved, ReportStatus::ConsentVerified]);
        for report in candidates {
            if !report.is_expired(now) {
                continue;
            }
            let has_role = match self
                .gateway
                .member_has_role(self.guild_id, report.user_id, self.minor_role_id)
                .await
            {
                Ok(has_role) => has_role,
                Err(GatewayError::NotFound(_)) => false,
                Err(e) => {
                    warn!(
                        target: SWEEP_TARGET,
                        user_id = %report.user_id,
                        error = %e,
                        "Failed to probe protective role"
                    );
                    continue;
                }
            };
            if !has_role {
                continue;
            }

            match self
                .gateway
                .remove_role(self.guild_id, report.user_id, self.minor_role_id)
                .await
            {
                Ok(()) | Err(GatewayError::NotFound(_)) => {
                    removed += 1;
                    info!(
                        target: SWEEP_TARGET,
                        user_id = %report.user_id,
                        report_id = %report.id,
                        "Protective role removed; user aged out"
                    );
                }
                Err(e) => {
                    warn!(
                        target: SWEEP_TARGET,
                        user_id = %report.user_id,
                        error = %e,
                        "Failed to remove protective role; will retry next cycle"
                    );
                }
            }
        }
        removed
    }

    /// Re-grant the protective role when a consent-verified user who has not
    /// yet aged out rejoins the guild. Returns whether a grant happened.
    pub async fn handle_member_join(&self, user_id: u64, now: DateTime<Utc>) -> bool {
        let verified = self
            .reports
            .by_status(&[ReportStatus::ConsentVerified])
            .into_iter()
            .find(|report| report.user_id == user_id && !report.is_expired(now));
        let Some(report) = verified else {
            return false;
        };

        match self
            .gateway
            .add_role(self.guild_id, user_id, self.minor_role_id)
            .await
        {
            Ok(()) => {
                info!(
                    target: SWEEP_TARGET,
                    user_id = %user_id,
                    report_id = %report.id,
                    "Protective role re-granted on rejoin"
                );
                true
            }
            Err(e) => {
                warn!(
                    target: SWEEP_TARGET,
                    user_id = %user_id,
                    error = %e,
                    "Failed to re-grant protective role on rejoin"
                );
                false
            }
        }
    }

    /// Spawn the sweep loop: a periodic tick plus an mpsc channel for
    /// on-demand cycles and shutdown.
    pub fn start(self, interval_seconds: u64) -> mpsc::Sender<SweepRequest> {
        let (tx, mut rx) = mpsc::channel::<SweepRequest>(32);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(std::time::Duration::from_secs(interval_seconds.max(1)));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.run_cycle(Utc::now()).await;
                    }
                    request = rx.recv() => {
                        match request {
                            Some(SweepRequest::RunAll) => {
                                self.run_cycle(Utc::now()).await;
                            }
                            Some(SweepRequest::Shutdown) | None => {
                                info!(target: SWEEP_TARGET, "Sweep task shutting down");
                                break;
                            }
                        }
                    }
                }
            }
        });
        tx
    }
}

/// Log-and-continue wrapper for callers that only care about errors.
pub async fn request_sweep(tx: &mpsc::Sender<SweepRequest>, request: SweepRequest) {
    if let Err(e) = tx.send(request).await {
        error!(target: SWEEP_TARGET, error = %e, "Sweep task unavailable");
    }
}
