//! Discord guild gateway
//!
//! Thin abstraction over the platform calls the workflow needs. Expected
//! Discord failures (missing permission, unknown member/ban) come back as
//! explicit error variants so callers branch on data instead of catching
//! exception types. Workflow tests mock this trait.

use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use serenity::http::{Http, HttpError};
use serenity::model::id::{GuildId, RoleId, UserId};
use std::sync::Arc;
use thiserror::Error;

/// Errors from guild gateway calls
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The bot lacks permission for the call
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Guild, member, role or ban does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Anything else: transport failures, rate limits, serenity errors
    #[error("transport error: {0}")]
    Transport(String),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Platform mutations and probes used by the minor-report workflow
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GuildGateway: Send + Sync {
    /// Whether the user is currently a member of the guild
    async fn is_member(&self, guild_id: u64, user_id: u64) -> GatewayResult<bool>;

    /// Whether the member currently holds the role
    async fn member_has_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> GatewayResult<bool>;

    /// Grant a role to a member
    async fn add_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> GatewayResult<()>;

    /// Remove a role from a member
    async fn remove_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> GatewayResult<()>;

    /// Ban a user with an audit-log reason
    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> GatewayResult<()>;

    /// Lift a user's ban
    async fn unban(&self, guild_id: u64, user_id: u64) -> GatewayResult<()>;
}

/// Serenity-backed gateway
#[derive(Clone)]
pub struct DiscordGateway {
    http: Arc<Http>,
}

impl DiscordGateway {
    #[must_use]
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn map_error(error: serenity::Error) -> GatewayError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &error {
        if response.status_code == serenity::http::StatusCode::FORBIDDEN {
            return GatewayError::PermissionDenied(response.error.message.clone());
        }
        if response.status_code == serenity::http::StatusCode::NOT_FOUND {
            return GatewayError::NotFound(response.error.message.clone());
        }
    }
    GatewayError::Transport(error.to_string())
}

fn is_not_found(error: &GatewayError) -> bool {
    matches!(error, GatewayError::NotFound(_))
}

#[async_trait]
impl GuildGateway for DiscordGateway {
    async fn is_member(&self, guild_id: u64, user_id: u64) -> GatewayResult<bool> {
        match self
            .http
            .get_member(GuildId::new(guild_id), UserId::new(user_id))
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let mapped = map_error(e);
                if is_not_found(&mapped) {
                    Ok(false)
                } else {
                    Err(mapped)
                }
            }
        }
    }

    async fn member_has_role(
        &self,
        guild_id: u64,
        user_id: u64,
        role_id: u64,
    ) -> GatewayResult<bool> {
        let member = self
            .http
            .get_member(GuildId::new(guild_id), UserId::new(user_id))
            .await
            .map_err(map_error)?;
        Ok(member.roles.contains(&RoleId::new(role_id)))
    }

    async fn add_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> GatewayResult<()> {
        self.http
            .add_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("minor report: protective role"),
            )
            .await
            .map_err(map_error)
    }

    async fn remove_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> GatewayResult<()> {
        self.http
            .remove_member_role(
                GuildId::new(guild_id),
                UserId::new(user_id),
                RoleId::new(role_id),
                Some("minor report: user aged out"),
            )
            .await
            .map_err(map_error)
    }

    async fn ban(&self, guild_id: u64, user_id: u64, reason: &str) -> GatewayResult<()> {
        self.http
            .ban_user(GuildId::new(guild_id), UserId::new(user_id), 0, Some(reason))
            .await
            .map_err(map_error)
    }

    async fn unban(&self, guild_id: u64, user_id: u64) -> GatewayResult<()> {
        self.http
            .remove_ban(
                GuildId::new(guild_id),
                UserId::new(user_id),
                Some("minor report: parental consent verified"),
            )
            .await
            .map_err(map_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_display() {
        let error = GatewayError::PermissionDenied("Missing Permissions".to_string());
        assert_eq!(error.to_string(), "permission denied: Missing Permissions");

        let error = GatewayError::NotFound("Unknown Member".to_string());
        assert!(is_not_found(&error));
    }
}
