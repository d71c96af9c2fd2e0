use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};
use crate::models::{ChannelInfo, ChannelKind, RoleInfo};

/// Roles and per-channel role overwrites as they were before a sync
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionBackup {
    pub version: u32,
    pub guild: String,
    pub taken_at: DateTime<Utc>,
    pub roles: Vec<RoleBackup>,
    pub channels: Vec<ChannelBackup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleBackup {
    pub id: u64,
    pub name: String,
    pub permissions: u64,
    pub position: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelBackup {
    pub id: u64,
    pub name: String,
    pub kind: ChannelKind,
    pub position: u16,
    pub overwrites: Vec<OverwriteBackup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverwriteBackup {
    pub role_id: u64,
    pub allow: u64,
    pub deny: u64,
}

impl PermissionBackup {
    pub fn capture<'a>(
        guild: &str,
        roles: impl IntoIterator<Item = &'a RoleInfo>,
        channels: &[ChannelInfo],
    ) -> Self {
        let mut roles: Vec<RoleBackup> = roles
            .into_iter()
            .map(|r| RoleBackup {
                id: r.id.get(),
                name: r.name.clone(),
                permissions: r.permissions.bits(),
                position: r.position,
            })
            .collect();
        roles.sort_by_key(|r| (r.position, r.id));

        let mut channels: Vec<ChannelBackup> = channels
            .iter()
            .map(|c| ChannelBackup {
                id: c.id.get(),
                name: c.name.clone(),
                kind: c.kind,
                position: c.position,
                overwrites: c
                    .overwrites
                    .iter()
                    .map(|o| OverwriteBackup {
                        role_id: o.role_id.get(),
                        allow: o.allow.bits(),
                        deny: o.deny.bits(),
                    })
                    .collect(),
            })
            .collect();
        channels.sort_by_key(|c| (c.position, c.id));

        Self {
            version: 1,
            guild: guild.to_string(),
            taken_at: Utc::now(),
            roles,
            channels,
        }
    }

    /// Save to a JSON file atomically
    pub async fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        let temp_path = format!("{}.tmp", path);
        tokio::fs::write(&temp_path, &content)
            .await
            .map_err(|e| BotError::StateSave {
                path: path.to_string(),
                source: e,
            })?;

        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| BotError::StateSave {
                path: path.to_string(),
                source: e,
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoleOverwrite;
    use poise::serenity_prelude as serenity;

    #[tokio::test]
    async fn test_capture_and_save() {
        let roles = vec![RoleInfo {
            id: serenity::RoleId::new(10),
            name: "builder".to_string(),
            permissions: serenity::Permissions::SEND_MESSAGES,
            position: 1,
        }];
        let channels = vec![ChannelInfo {
            id: serenity::ChannelId::new(500),
            name: "general".to_string(),
            kind: ChannelKind::Text,
            position: 0,
            overwrites: vec![RoleOverwrite {
                role_id: serenity::RoleId::new(10),
                allow: serenity::Permissions::MANAGE_CHANNELS,
                deny: serenity::Permissions::empty(),
            }],
        }];

        let backup = PermissionBackup::capture("916300758834630666", &roles, &channels);
        assert_eq!(backup.roles[0].permissions, serenity::Permissions::SEND_MESSAGES.bits());
        assert_eq!(
            backup.channels[0].overwrites[0].allow,
            serenity::Permissions::MANAGE_CHANNELS.bits()
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json").to_string_lossy().to_string();
        backup.save(&path).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let reloaded: PermissionBackup = serde_json::from_str(&content).unwrap();
        assert_eq!(reloaded.channels, backup.channels);
        assert_eq!(reloaded.roles, backup.roles);
    }
}
