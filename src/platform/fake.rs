//! In-memory [`ChatPlatform`] recording every outbound call.

use async_trait::async_trait;
use parking_lot::Mutex;
use poise::serenity_prelude::{self as serenity, ChannelId, GuildId, RoleId, UserId};
use std::collections::HashMap;

use super::{ChatPlatform, SendOptions};
use crate::error::{BotError, Result};
use crate::models::{ChannelInfo, GuildSummary, HistoryMessage, MemberInfo, RoleInfo, RoleOverwrite};

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Channel {
        channel_id: ChannelId,
        text: String,
        options: SendOptions,
    },
    Direct {
        user_id: UserId,
        text: String,
    },
    Overwrite {
        channel_id: ChannelId,
        role_id: RoleId,
        allow: serenity::Permissions,
        deny: serenity::Permissions,
    },
}

#[derive(Default)]
pub struct FakePlatform {
    pub guilds: Vec<GuildSummary>,
    pub roles: Vec<RoleInfo>,
    pub members: Vec<MemberInfo>,
    pub channels: Mutex<Vec<ChannelInfo>>,
    pub history: HashMap<ChannelId, Vec<HistoryMessage>>,
    pub fail_history: bool,
    sent: Mutex<Vec<Sent>>,
    calls: Mutex<Vec<&'static str>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_guild(mut self, id: u64, name: &str) -> Self {
        self.guilds.push(GuildSummary {
            id: GuildId::new(id),
            name: name.to_string(),
        });
        self
    }

    pub fn with_role(mut self, id: u64, name: &str) -> Self {
        self.roles.push(RoleInfo {
            id: RoleId::new(id),
            name: name.to_string(),
            permissions: serenity::Permissions::empty(),
            position: self.roles.len() as u16,
        });
        self
    }

    pub fn with_member(mut self, member: MemberInfo) -> Self {
        self.members.push(member);
        self
    }

    pub fn with_channel(self, channel: ChannelInfo) -> Self {
        self.channels.lock().push(channel);
        self
    }

    pub fn with_history(mut self, channel_id: u64, messages: Vec<HistoryMessage>) -> Self {
        self.history.insert(ChannelId::new(channel_id), messages);
        self
    }

    /// Every outbound call, in order
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    /// Names of the fetch calls made, in order
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    pub fn channel(&self, id: u64) -> Option<ChannelInfo> {
        self.channels
            .lock()
            .iter()
            .find(|c| c.id == ChannelId::new(id))
            .cloned()
    }

    pub fn direct_messages_to(&self, user: u64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Direct { user_id, text } if user_id == UserId::new(user) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn channel_messages_in(&self, channel: u64) -> Vec<(String, SendOptions)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Channel {
                    channel_id,
                    text,
                    options,
                } if channel_id == ChannelId::new(channel) => Some((text, options)),
                _ => None,
            })
            .collect()
    }

    pub fn overwrite_writes(&self) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Overwrite { .. }))
            .count()
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn list_guilds(&self) -> Result<Vec<GuildSummary>> {
        self.calls.lock().push("guilds");
        Ok(self.guilds.clone())
    }

    async fn fetch_roles(&self, _guild_id: GuildId) -> Result<Vec<RoleInfo>> {
        self.calls.lock().push("roles");
        Ok(self.roles.clone())
    }

    async fn fetch_members(&self, _guild_id: GuildId, limit: u64) -> Result<Vec<MemberInfo>> {
        self.calls.lock().push("members");
        Ok(self.members.iter().take(limit as usize).cloned().collect())
    }

    async fn fetch_channels(&self, _guild_id: GuildId) -> Result<Vec<ChannelInfo>> {
        self.calls.lock().push("channels");
        Ok(self.channels.lock().clone())
    }

    async fn fetch_history(&self, channel_id: ChannelId, limit: u64) -> Result<Vec<HistoryMessage>> {
        self.calls.lock().push("history");
        if self.fail_history {
            return Err(BotError::Transport {
                operation: "fetch history".to_string(),
                message: "connection reset".to_string(),
            });
        }
        Ok(self
            .history
            .get(&channel_id)
            .map(|h| h.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }

    async fn send_channel_message(
        &self,
        channel_id: ChannelId,
        text: &str,
        options: SendOptions,
    ) -> Result<()> {
        self.sent.lock().push(Sent::Channel {
            channel_id,
            text: text.to_string(),
            options,
        });
        Ok(())
    }

    async fn send_direct_message(&self, user_id: UserId, text: &str) -> Result<()> {
        self.sent.lock().push(Sent::Direct {
            user_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn set_role_overwrite(
        &self,
        channel_id: ChannelId,
        role_id: RoleId,
        allow: serenity::Permissions,
        deny: serenity::Permissions,
    ) -> Result<()> {
        self.sent.lock().push(Sent::Overwrite {
            channel_id,
            role_id,
            allow,
            deny,
        });

        let mut channels = self.channels.lock();
        if let Some(channel) = channels.iter_mut().find(|c| c.id == channel_id) {
            channel.overwrites.retain(|o| o.role_id != role_id);
            channel.overwrites.push(RoleOverwrite {
                role_id,
                allow,
                deny,
            });
        }
        Ok(())
    }
}
