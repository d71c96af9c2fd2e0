use async_trait::async_trait;
use poise::serenity_prelude::ChannelId;
use std::time::Duration;
use tracing::{info, warn};

use super::{FeatureHandler, SessionLocks};
use crate::config::{ClaimConfig, Claimable, GuildTarget, Whitelists};
use crate::error::{BotError, Result};
use crate::guild::{GuildHooks, GuildSnapshot, SnapshotCache};
use crate::messages;
use crate::models::{IncomingMessage, MemberInfo};
use crate::platform::{send_chunked, send_direct_chunked, ChatPlatform, SendOptions};
use crate::state::{create_shared_claim_ledger, ClaimLedger, SharedClaimLedger};

const ACK_TTL: Duration = Duration::from_secs(60);
const REJECTION_TTL: Duration = Duration::from_secs(3600 * 24);
const MENTION_TTL: Duration = Duration::from_secs(3600 * 8);

/// Sends whitelisted users their claim URLs when they DM a magic spell
pub struct ClaimDistributor {
    cache: SnapshotCache,
    member_limit: u64,
    config: ClaimConfig,
    whitelists: Whitelists,
    ledger: SharedClaimLedger,
    sessions: SessionLocks,
}

impl ClaimDistributor {
    pub fn new(
        target: GuildTarget,
        member_limit: u64,
        config: ClaimConfig,
        whitelists: Whitelists,
        ledger: ClaimLedger,
    ) -> Self {
        Self {
            cache: SnapshotCache::new(target, member_limit),
            member_limit,
            config,
            whitelists,
            ledger: create_shared_claim_ledger(ledger),
            sessions: SessionLocks::new(),
        }
    }

    #[cfg(test)]
    pub fn ledger(&self) -> SharedClaimLedger {
        self.ledger.clone()
    }

    /// The spell advertised to users
    fn primary_spell(&self) -> &str {
        self.config
            .magic_spells
            .iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn is_claim_request(&self, content: &str) -> bool {
        self.config
            .magic_spells
            .iter()
            .any(|spell| !spell.is_empty() && content.starts_with(spell.as_str()))
    }

    fn is_admin(&self, author: &MemberInfo) -> bool {
        !self.config.admin_identity.is_empty() && author.has_identity(&self.config.admin_identity)
    }

    fn is_mention_target(&self, member: &MemberInfo) -> bool {
        self.config.mention_identities.iter().any(|identity| {
            member.has_identity(identity) || (!identity.contains('#') && member.name == *identity)
        })
    }

    async fn on_claim(&self, platform: &dyn ChatPlatform, msg: &IncomingMessage) -> Result<()> {
        let tag = msg.author.tag();
        info!("Claim request from {} ({})", tag, msg.author.id);

        let claimable = self.whitelists.claimable_for(&msg.author);
        if claimable.is_empty() {
            let rejection = BotError::NotWhitelisted { user: tag.clone() };
            info!("{}", rejection);
            send_chunked(
                platform,
                msg.channel_id,
                &messages::claim_rejection_message(&tag),
                SendOptions::delete_after(REJECTION_TTL),
            )
            .await?;
            return Ok(());
        }

        send_direct_chunked(
            platform,
            msg.author.id,
            &messages::claim_private_message(&self.config.tutorial_link, &claimable),
        )
        .await?;
        send_chunked(
            platform,
            msg.channel_id,
            &messages::claim_success_message(&tag),
            SendOptions::delete_after(ACK_TTL),
        )
        .await?;

        self.persist(&msg.author, &claimable).await
    }

    /// Record delivered claims and save the ledger
    async fn persist(&self, author: &MemberInfo, claimable: &Claimable) -> Result<()> {
        let mut ledger = self.ledger.write().await;
        let user_id = author.id.to_string();
        let tag = author.tag();

        for (project, url) in claimable {
            if !ledger.record(&user_id, &tag, project, url) {
                let times = ledger
                    .get(&user_id, project)
                    .map(|r| r.claim_count)
                    .unwrap_or_default();
                info!("{} claimed {} again ({} times)", tag, project, times);
            }
        }
        ledger.save(&self.config.ledger_path).await?;
        info!(
            "Recorded {} claim(s) for {}, {} total",
            claimable.len(),
            tag,
            ledger.claim_count()
        );
        Ok(())
    }

    /// Admin-only: mention the configured members in a public channel
    async fn on_member_stat(&self, platform: &dyn ChatPlatform, msg: &IncomingMessage) -> Result<()> {
        let guild = self.cache.shared().read().await.guild.clone();
        let guild = match guild {
            Some(g) => g,
            None => {
                warn!("Stat spell received before the guild snapshot was ready");
                return Ok(());
            }
        };

        let members = platform.fetch_members(guild.id, self.member_limit).await?;
        info!("{} members in {}!", members.len(), guild.name);

        let mentions: Vec<String> = members
            .iter()
            .filter(|m| self.is_mention_target(m))
            .map(MemberInfo::mention)
            .collect();
        if mentions.is_empty() {
            info!("No members to mention for the stat spell");
            return Ok(());
        }

        let channel_id = self
            .config
            .announce_channel_id
            .map(ChannelId::new)
            .unwrap_or(msg.channel_id);
        send_chunked(
            platform,
            channel_id,
            &messages::stat_mention_message(&mentions, self.primary_spell()),
            SendOptions::delete_after(MENTION_TTL),
        )
        .await
    }
}

#[async_trait]
impl GuildHooks for ClaimDistributor {
    /// Invite whitelisted members present in the guild to claim
    async fn on_members_post(&self, platform: &dyn ChatPlatform, snapshot: &GuildSnapshot) -> Result<()> {
        if !self.config.announce_on_connect {
            return Ok(());
        }
        let channel_id = match self.config.announce_channel_id {
            Some(id) => ChannelId::new(id),
            None => {
                warn!("announce_on_connect is set but no announce_channel_id is configured");
                return Ok(());
            }
        };
        if snapshot.channel(channel_id).is_none() {
            return Err(BotError::ChannelNotFound {
                id: channel_id.get(),
            });
        }

        for project in self.whitelists.project_names() {
            if self.config.announce_skip_projects.contains(project) {
                continue;
            }
            let whitelisted = self.whitelists.members_in(project, &snapshot.members);
            if whitelisted.is_empty() {
                info!("No whitelisted members for {}", project);
                continue;
            }

            let mentions: Vec<String> = whitelisted.iter().map(|m| m.mention()).collect();
            send_chunked(
                platform,
                channel_id,
                &messages::whitelist_mention_message(&mentions, project, self.primary_spell()),
                SendOptions::delete_after(MENTION_TTL),
            )
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl FeatureHandler for ClaimDistributor {
    fn name(&self) -> &'static str {
        "claim"
    }

    async fn on_connected(&self, platform: &dyn ChatPlatform) -> Result<()> {
        self.cache.refresh(platform, self).await?;
        info!(
            "Ask users to send following commands: {}",
            self.config
                .magic_spells
                .iter()
                .map(|s| format!("`{}`", s))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(())
    }

    async fn on_message(&self, platform: &dyn ChatPlatform, msg: &IncomingMessage) -> Result<()> {
        if msg.from_self {
            return Ok(());
        }
        let _session = self.sessions.acquire(msg.author.id).await;

        if self.is_admin(&msg.author)
            && !self.config.stat_spell.is_empty()
            && msg.content.starts_with(&self.config.stat_spell)
        {
            return self.on_member_stat(platform, msg).await;
        }

        if !msg.is_direct && !self.config.allow_guild_channels {
            return Ok(());
        }
        if self.is_claim_request(&msg.content) {
            self.on_claim(platform, msg).await?;
        }
        Ok(())
    }
}
