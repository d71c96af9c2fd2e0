// src/models.rs
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use serde::{Deserialize, Serialize};

/// A guild visible to the bot's credentials
#[derive(Debug, Clone, PartialEq)]
pub struct GuildSummary {
    pub id: serenity::GuildId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoleInfo {
    pub id: serenity::RoleId,
    pub name: String,
    pub permissions: serenity::Permissions,
    pub position: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberInfo {
    pub id: serenity::UserId,
    pub name: String,
    /// Legacy four digit discriminator, `None` for migrated usernames
    pub discriminator: Option<u16>,
    pub joined_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub bot: bool,
}

impl MemberInfo {
    /// `name#1234` for legacy accounts, the bare name otherwise
    pub fn tag(&self) -> String {
        match self.discriminator {
            Some(d) if d != 0 => format!("{}#{:04}", self.name, d),
            _ => self.name.clone(),
        }
    }

    /// Discord mention markup
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }

    /// Matches either the numeric ID or the tag, exactly
    pub fn has_identity(&self, identity: &str) -> bool {
        self.id.to_string() == identity || self.tag() == identity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Category,
    Text,
    Voice,
    Other,
}

impl From<serenity::ChannelType> for ChannelKind {
    fn from(kind: serenity::ChannelType) -> Self {
        match kind {
            serenity::ChannelType::Category => ChannelKind::Category,
            serenity::ChannelType::Text | serenity::ChannelType::News => ChannelKind::Text,
            serenity::ChannelType::Voice | serenity::ChannelType::Stage => ChannelKind::Voice,
            _ => ChannelKind::Other,
        }
    }
}

/// Allow/deny pair for a single role on a single channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleOverwrite {
    pub role_id: serenity::RoleId,
    pub allow: serenity::Permissions,
    pub deny: serenity::Permissions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub id: serenity::ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub position: u16,
    /// Role overwrites only; member overwrites are left alone
    pub overwrites: Vec<RoleOverwrite>,
}

impl ChannelInfo {
    pub fn overwrite_for(&self, role_id: serenity::RoleId) -> Option<&RoleOverwrite> {
        self.overwrites.iter().find(|o| o.role_id == role_id)
    }
}

/// A message delivered by the gateway, reduced to what the features read
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub channel_id: serenity::ChannelId,
    pub author: MemberInfo,
    pub content: String,
    /// Sent in a one-to-one DM channel
    pub is_direct: bool,
    /// Sent by this bot's own account
    pub from_self: bool,
}

/// A message read back from channel history
#[derive(Debug, Clone)]
pub struct HistoryMessage {
    pub channel_id: serenity::ChannelId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub author: MemberInfo,
}

/// Convert a serenity timestamp into a chrono UTC datetime
pub fn to_utc(ts: serenity::Timestamp) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(ts.unix_timestamp(), 0).unwrap_or_default()
}

#[cfg(test)]
pub(crate) fn member(id: u64, name: &str, discriminator: Option<u16>) -> MemberInfo {
    MemberInfo {
        id: serenity::UserId::new(id),
        name: name.to_string(),
        discriminator,
        joined_at: None,
        created_at: DateTime::<Utc>::from_timestamp(1_638_000_000, 0).unwrap_or_default(),
        bot: false,
    }
}
