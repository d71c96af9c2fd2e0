//! Port between the bot features and the Discord client.
//!
//! Features only talk to Discord through [`ChatPlatform`], so the serenity
//! implementation can be swapped for an in-memory fake in tests.

pub mod chunked;
pub mod retry;
pub mod serenity_platform;

#[cfg(test)]
pub mod fake;

use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::time::Duration;

use crate::error::Result;
use crate::models::{ChannelInfo, GuildSummary, HistoryMessage, MemberInfo, RoleInfo};

pub use chunked::{send_chunked, send_direct_chunked};
pub use serenity_platform::SerenityPlatform;

/// Options applied to an outbound channel message
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Delete the message after this long
    pub delete_after: Option<Duration>,
}

impl SendOptions {
    pub fn delete_after(duration: Duration) -> Self {
        Self {
            delete_after: Some(duration),
        }
    }
}

/// Every Discord operation the features rely on
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Guilds visible to the bot's credentials
    async fn list_guilds(&self) -> Result<Vec<GuildSummary>>;

    async fn fetch_roles(&self, guild_id: serenity::GuildId) -> Result<Vec<RoleInfo>>;

    /// Members of the guild, at most `limit`
    async fn fetch_members(&self, guild_id: serenity::GuildId, limit: u64)
        -> Result<Vec<MemberInfo>>;

    async fn fetch_channels(&self, guild_id: serenity::GuildId) -> Result<Vec<ChannelInfo>>;

    /// Most recent messages of a channel, newest first, at most `limit`
    async fn fetch_history(
        &self,
        channel_id: serenity::ChannelId,
        limit: u64,
    ) -> Result<Vec<HistoryMessage>>;

    async fn send_channel_message(
        &self,
        channel_id: serenity::ChannelId,
        text: &str,
        options: SendOptions,
    ) -> Result<()>;

    async fn send_direct_message(&self, user_id: serenity::UserId, text: &str) -> Result<()>;

    /// Replace the role's overwrite on the channel with the given pair
    async fn set_role_overwrite(
        &self,
        channel_id: serenity::ChannelId,
        role_id: serenity::RoleId,
        allow: serenity::Permissions,
        deny: serenity::Permissions,
    ) -> Result<()>;
}
