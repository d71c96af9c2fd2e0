use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::info;

use crate::config::GuildTarget;
use crate::error::{BotError, Result};
use crate::models::{ChannelInfo, GuildSummary, MemberInfo, RoleInfo};
use crate::platform::ChatPlatform;

/// Roles, members and channels of the target guild, fetched once per connection
#[derive(Debug, Clone, Default)]
pub struct GuildSnapshot {
    pub guild: Option<GuildSummary>,
    pub roles: Vec<RoleInfo>,
    pub members: Vec<MemberInfo>,
    pub channels: Vec<ChannelInfo>,
}

impl GuildSnapshot {
    pub fn guild_label(&self) -> String {
        match &self.guild {
            Some(g) => format!("{} ({})", g.name, g.id),
            None => "<not connected>".to_string(),
        }
    }

    pub fn channel(&self, channel_id: serenity::ChannelId) -> Option<&ChannelInfo> {
        self.channels.iter().find(|c| c.id == channel_id)
    }
}

/// Feature-specific processing run while the snapshot is being built.
/// Every hook is a no-op unless overridden.
#[async_trait]
pub trait GuildHooks: Send + Sync {
    async fn on_roles(&self, _platform: &dyn ChatPlatform, _roles: &[RoleInfo]) -> Result<()> {
        Ok(())
    }

    async fn on_members(
        &self,
        _platform: &dyn ChatPlatform,
        _members: &[MemberInfo],
    ) -> Result<()> {
        Ok(())
    }

    async fn on_channels(
        &self,
        _platform: &dyn ChatPlatform,
        _channels: &[ChannelInfo],
    ) -> Result<()> {
        Ok(())
    }

    /// Runs once members and channels are both known
    async fn on_members_post(
        &self,
        _platform: &dyn ChatPlatform,
        _snapshot: &GuildSnapshot,
    ) -> Result<()> {
        Ok(())
    }
}

/// Shared snapshot, written on connect and read by message handlers
pub type SharedGuildSnapshot = Arc<tokio::sync::RwLock<GuildSnapshot>>;

pub fn create_shared_guild_snapshot() -> SharedGuildSnapshot {
    Arc::new(tokio::sync::RwLock::new(GuildSnapshot::default()))
}

/// Locates the target guild and fills the shared snapshot
pub struct SnapshotCache {
    target: GuildTarget,
    member_limit: u64,
    snapshot: SharedGuildSnapshot,
}

impl SnapshotCache {
    pub fn new(target: GuildTarget, member_limit: u64) -> Self {
        Self {
            target,
            member_limit,
            snapshot: create_shared_guild_snapshot(),
        }
    }

    pub fn shared(&self) -> SharedGuildSnapshot {
        self.snapshot.clone()
    }

    pub fn target(&self) -> &GuildTarget {
        &self.target
    }

    /// Find the target among the visible guilds
    pub fn locate(&self, guilds: &[GuildSummary]) -> Result<GuildSummary> {
        guilds
            .iter()
            .find(|g| match &self.target {
                GuildTarget::Id(id) => g.id.get() == *id,
                GuildTarget::Name(name) => &g.name == name,
            })
            .cloned()
            .ok_or_else(|| BotError::GuildNotFound {
                target: self.target.to_string(),
                available: guilds
                    .iter()
                    .map(|g| format!("{} ({})", g.name, g.id))
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    /// Fetch roles, members and channels in that order, running the hooks.
    ///
    /// The snapshot lock is held for the whole refresh so message handlers
    /// never observe a half-built snapshot.
    pub async fn refresh(&self, platform: &dyn ChatPlatform, hooks: &dyn GuildHooks) -> Result<()> {
        let guilds = platform.list_guilds().await?;
        let guild = self.locate(&guilds)?;
        info!("Managing guild {} ({})", guild.name, guild.id);

        let mut snapshot = self.snapshot.write().await;
        *snapshot = GuildSnapshot {
            guild: Some(guild.clone()),
            ..GuildSnapshot::default()
        };

        snapshot.roles = platform.fetch_roles(guild.id).await?;
        info!("Fetched {} roles", snapshot.roles.len());
        hooks.on_roles(platform, &snapshot.roles).await?;

        snapshot.members = platform.fetch_members(guild.id, self.member_limit).await?;
        info!("{} members in {}", snapshot.members.len(), guild.name);
        hooks.on_members(platform, &snapshot.members).await?;

        snapshot.channels = platform.fetch_channels(guild.id).await?;
        info!("Fetched {} channels", snapshot.channels.len());
        hooks.on_channels(platform, &snapshot.channels).await?;

        hooks.on_members_post(platform, &snapshot).await?;
        Ok(())
    }
}
