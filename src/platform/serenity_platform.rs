use async_trait::async_trait;
use poise::serenity_prelude::{self as serenity, ChannelId, GuildId, Http, RoleId, UserId};
use std::sync::Arc;
use tracing::{debug, warn};

use super::retry::{is_transient, with_retry, RetryPolicy};
use super::{ChatPlatform, SendOptions};
use crate::error::Result;
use crate::models::{
    to_utc, ChannelInfo, ChannelKind, GuildSummary, HistoryMessage, MemberInfo, RoleInfo,
    RoleOverwrite,
};

/// Discord caps member listing at 1000 and history at 100 per request
const MEMBER_PAGE_SIZE: u64 = 1000;
const HISTORY_PAGE_SIZE: u64 = 100;

/// [`ChatPlatform`] backed by serenity's HTTP client
pub struct SerenityPlatform {
    http: Arc<Http>,
    retry: RetryPolicy,
    guild_fetch_limit: u64,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>, retry: RetryPolicy, guild_fetch_limit: u64) -> Self {
        Self {
            http,
            retry,
            guild_fetch_limit,
        }
    }
}

pub(crate) fn user_info(user: &serenity::User) -> MemberInfo {
    MemberInfo {
        id: user.id,
        name: user.name.clone(),
        discriminator: user.discriminator.map(|d| d.get()),
        joined_at: None,
        created_at: to_utc(user.id.created_at()),
        bot: user.bot,
    }
}

fn member_info(member: &serenity::Member) -> MemberInfo {
    MemberInfo {
        joined_at: member.joined_at.map(to_utc),
        ..user_info(&member.user)
    }
}

fn channel_info(channel: &serenity::GuildChannel) -> ChannelInfo {
    let overwrites = channel
        .permission_overwrites
        .iter()
        .filter_map(|o| match o.kind {
            serenity::PermissionOverwriteType::Role(role_id) => Some(RoleOverwrite {
                role_id,
                allow: o.allow,
                deny: o.deny,
            }),
            _ => None,
        })
        .collect();

    ChannelInfo {
        id: channel.id,
        name: channel.name.clone(),
        kind: ChannelKind::from(channel.kind),
        position: channel.position,
        overwrites,
    }
}

#[async_trait]
impl ChatPlatform for SerenityPlatform {
    async fn list_guilds(&self) -> Result<Vec<GuildSummary>> {
        let http = self.http.as_ref();
        let limit = self.guild_fetch_limit;
        let guilds = with_retry(&self.retry, "list guilds", is_transient, || {
            http.get_guilds(None, Some(limit))
        })
        .await?;

        Ok(guilds
            .into_iter()
            .map(|g| GuildSummary {
                id: g.id,
                name: g.name,
            })
            .collect())
    }

    async fn fetch_roles(&self, guild_id: GuildId) -> Result<Vec<RoleInfo>> {
        let http = self.http.as_ref();
        let roles = with_retry(&self.retry, "fetch roles", is_transient, || {
            guild_id.roles(http)
        })
        .await?;

        Ok(roles
            .into_values()
            .map(|r| RoleInfo {
                id: r.id,
                name: r.name,
                permissions: r.permissions,
                position: r.position,
            })
            .collect())
    }

    async fn fetch_members(&self, guild_id: GuildId, limit: u64) -> Result<Vec<MemberInfo>> {
        let http = self.http.as_ref();
        let mut members: Vec<MemberInfo> = Vec::new();
        let mut after: Option<UserId> = None;

        while (members.len() as u64) < limit {
            let page_size = (limit - members.len() as u64).min(MEMBER_PAGE_SIZE);
            let page = with_retry(&self.retry, "fetch members", is_transient, move || {
                guild_id.members(http, Some(page_size), after)
            })
            .await?;

            let fetched = page.len() as u64;
            after = page.last().map(|m| m.user.id);
            members.extend(page.iter().map(member_info));
            debug!("Fetched {} members ({} total)", fetched, members.len());

            if fetched < page_size {
                break;
            }
        }

        Ok(members)
    }

    async fn fetch_channels(&self, guild_id: GuildId) -> Result<Vec<ChannelInfo>> {
        let http = self.http.as_ref();
        let channels = with_retry(&self.retry, "fetch channels", is_transient, || {
            guild_id.channels(http)
        })
        .await?;

        Ok(channels.values().map(channel_info).collect())
    }

    async fn fetch_history(&self, channel_id: ChannelId, limit: u64) -> Result<Vec<HistoryMessage>> {
        let http = self.http.as_ref();
        let mut history: Vec<HistoryMessage> = Vec::new();
        let mut before: Option<serenity::MessageId> = None;

        while (history.len() as u64) < limit {
            let page_size = (limit - history.len() as u64).min(HISTORY_PAGE_SIZE);
            let page = with_retry(&self.retry, "fetch history", is_transient, move || {
                let mut builder = serenity::GetMessages::new().limit(page_size as u8);
                if let Some(id) = before {
                    builder = builder.before(id);
                }
                channel_id.messages(http, builder)
            })
            .await?;

            let fetched = page.len() as u64;
            before = page.last().map(|m| m.id);
            history.extend(page.iter().map(|m| HistoryMessage {
                channel_id: m.channel_id,
                content: m.content.clone(),
                created_at: to_utc(m.timestamp),
                author: user_info(&m.author),
            }));

            if fetched < page_size {
                break;
            }
        }

        Ok(history)
    }

    async fn send_channel_message(
        &self,
        channel_id: ChannelId,
        text: &str,
        options: SendOptions,
    ) -> Result<()> {
        let http = self.http.as_ref();
        let message = with_retry(&self.retry, "send channel message", is_transient, || {
            channel_id.send_message(http, serenity::CreateMessage::new().content(text))
        })
        .await?;

        if let Some(delay) = options.delete_after {
            let http = self.http.clone();
            let message_id = message.id;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = channel_id.delete_message(&http, message_id).await {
                    warn!("Failed to auto-delete message {}: {}", message_id, e);
                }
            });
        }

        Ok(())
    }

    async fn send_direct_message(&self, user_id: UserId, text: &str) -> Result<()> {
        let http = self.http.as_ref();
        with_retry(&self.retry, "send direct message", is_transient, || {
            user_id.direct_message(http, serenity::CreateMessage::new().content(text))
        })
        .await?;
        Ok(())
    }

    async fn set_role_overwrite(
        &self,
        channel_id: ChannelId,
        role_id: RoleId,
        allow: serenity::Permissions,
        deny: serenity::Permissions,
    ) -> Result<()> {
        let http = self.http.as_ref();
        with_retry(&self.retry, "set permission overwrite", is_transient, || {
            channel_id.create_permission(
                http,
                serenity::PermissionOverwrite {
                    allow,
                    deny,
                    kind: serenity::PermissionOverwriteType::Role(role_id),
                },
            )
        })
        .await
    }
}
