use async_trait::async_trait;
use poise::serenity_prelude::UserId;
use tracing::{info, warn};

use super::{FeatureHandler, SessionLocks};
use crate::config::{GuildTarget, RelayConfig};
use crate::error::{BotError, Result};
use crate::guild::{GuildHooks, SnapshotCache};
use crate::messages;
use crate::models::{IncomingMessage, MemberInfo};
use crate::platform::{send_chunked, send_direct_chunked, ChatPlatform, SendOptions};

/// Who an indirect message is addressed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayTarget {
    Id(UserId),
    /// `name#1234`
    Tag(String),
}

impl std::fmt::Display for RelayTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayTarget::Id(id) => write!(f, "{}", id),
            RelayTarget::Tag(tag) => write!(f, "{}", tag),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCommand {
    pub target: RelayTarget,
    pub body: String,
}

/// Parse `<prefix><d><target><d><body>`; the body may itself contain the delimiter
pub fn parse_relay_command(content: &str, prefix: &str, delimiter: &str) -> Result<RelayCommand> {
    let usage = || {
        BotError::format(format!(
            "Invalid format, expected `{p}{d}<user ID or name#tag>{d}<message>`",
            p = prefix,
            d = delimiter
        ))
    };

    let rest = content
        .strip_prefix(prefix)
        .and_then(|r| r.strip_prefix(delimiter))
        .ok_or_else(usage)?;

    let segments: Vec<&str> = rest.split(delimiter).collect();
    if segments.len() < 2 {
        return Err(usage());
    }

    let raw_target = segments[0].trim();
    let target = if raw_target.contains('#') {
        RelayTarget::Tag(raw_target.to_string())
    } else {
        match raw_target.parse::<u64>() {
            Ok(id) if id != 0 => RelayTarget::Id(UserId::new(id)),
            _ => {
                return Err(BotError::format(format!(
                    "`{}` is neither a numeric user ID nor a name#tag",
                    raw_target
                )))
            }
        }
    };

    let body = segments[1..].join(delimiter);
    if body.trim().is_empty() {
        return Err(BotError::format("Message body must not be empty"));
    }

    Ok(RelayCommand { target, body })
}

/// Forwards a DM to another guild member without revealing the sender
pub struct IndirectRelay {
    cache: SnapshotCache,
    config: RelayConfig,
    sessions: SessionLocks,
}

impl IndirectRelay {
    pub fn new(target: GuildTarget, member_limit: u64, config: RelayConfig) -> Self {
        Self {
            cache: SnapshotCache::new(target, member_limit),
            config,
            sessions: SessionLocks::new(),
        }
    }

    fn is_command(&self, content: &str) -> bool {
        content
            .strip_prefix(self.config.prefix.as_str())
            .map(|r| r.starts_with(self.config.delimiter.as_str()))
            .unwrap_or(false)
    }

    /// Exactly one cached member must match the target
    async fn resolve(&self, target: &RelayTarget) -> Result<MemberInfo> {
        let shared = self.cache.shared();
        let snapshot = shared.read().await;

        let matches: Vec<&MemberInfo> = snapshot
            .members
            .iter()
            .filter(|m| match target {
                RelayTarget::Id(id) => m.id == *id,
                RelayTarget::Tag(tag) => m.tag() == *tag,
            })
            .collect();

        match matches.as_slice() {
            [member] => Ok((*member).clone()),
            [] => Err(BotError::MemberNotFound {
                target: target.to_string(),
                guild: snapshot.guild_label(),
            }),
            many => Err(BotError::AmbiguousMember {
                target: target.to_string(),
                guild: snapshot.guild_label(),
                count: many.len(),
            }),
        }
    }

    async fn relay(&self, platform: &dyn ChatPlatform, msg: &IncomingMessage) -> Result<()> {
        let command =
            parse_relay_command(&msg.content, &self.config.prefix, &self.config.delimiter)?;
        let recipient = self.resolve(&command.target).await?;

        send_direct_chunked(platform, recipient.id, &command.body).await?;
        info!(
            "Relayed a {} character message from {} to {}",
            command.body.chars().count(),
            msg.author.id,
            recipient.id
        );

        send_chunked(
            platform,
            msg.channel_id,
            &messages::relay_success_message(&recipient.tag(), &command.body),
            SendOptions::default(),
        )
        .await
    }
}

impl GuildHooks for IndirectRelay {}

#[async_trait]
impl FeatureHandler for IndirectRelay {
    fn name(&self) -> &'static str {
        "relay"
    }

    async fn on_connected(&self, platform: &dyn ChatPlatform) -> Result<()> {
        self.cache.refresh(platform, self).await?;
        info!(
            "Relay ready, command format: {p}{d}<user>{d}<message>",
            p = self.config.prefix,
            d = self.config.delimiter
        );
        Ok(())
    }

    async fn on_message(&self, platform: &dyn ChatPlatform, msg: &IncomingMessage) -> Result<()> {
        if msg.from_self || !msg.is_direct {
            return Ok(());
        }
        let _session = self.sessions.acquire(msg.author.id).await;

        platform
            .send_channel_message(
                msg.channel_id,
                &messages::relay_receipt_message(),
                SendOptions::default(),
            )
            .await?;

        if !self.is_command(&msg.content) {
            return platform
                .send_channel_message(
                    msg.channel_id,
                    &messages::relay_usage_message(&self.config.prefix, &self.config.delimiter),
                    SendOptions::default(),
                )
                .await;
        }

        match self.relay(platform, msg).await {
            Err(e) if e.is_user_facing() => {
                warn!("Relay request from {} rejected: {}", msg.author.id, e);
                send_chunked(platform, msg.channel_id, &e.to_string(), SendOptions::default())
                    .await
            }
            other => other,
        }
    }
}
