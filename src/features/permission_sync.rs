use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use poise::serenity_prelude::{Permissions, RoleId};
use std::collections::HashMap;
use tracing::{debug, info};

use super::FeatureHandler;
use crate::config::{GuildTarget, PermissionSyncConfig};
use crate::error::{BotError, Result};
use crate::guild::{GuildHooks, SnapshotCache};
use crate::models::{ChannelInfo, ChannelKind, RoleInfo};
use crate::platform::ChatPlatform;
use crate::state::PermissionBackup;

/// Capabilities a protected role must never hold on a channel:
/// manage channel, manage permissions, manage threads
pub const PROTECTED_CAPABILITIES: Permissions = Permissions::MANAGE_CHANNELS
    .union(Permissions::MANAGE_ROLES)
    .union(Permissions::MANAGE_THREADS);

/// Force the protected capabilities to denied, leaving every other bit alone
pub fn protect_overwrite(allow: Permissions, deny: Permissions) -> (Permissions, Permissions) {
    (
        allow.difference(PROTECTED_CAPABILITIES),
        deny.union(PROTECTED_CAPABILITIES),
    )
}

/// Summary of a synchronization run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SyncReport {
    pub channels_synced: Vec<String>,
    pub categories: Vec<String>,
    pub skipped: Vec<String>,
    pub overwrites_written: usize,
    pub overwrites_unchanged: usize,
    pub overwrites_suppressed: usize,
}

impl SyncReport {
    pub fn format(&self) -> String {
        let mut lines = vec![format!(
            "Synced {} channels ({} categories, {} other channels skipped)",
            self.channels_synced.len(),
            self.categories.len(),
            self.skipped.len()
        )];
        lines.push(format!(
            "Overwrites: {} written, {} already protected, {} suppressed by dry run",
            self.overwrites_written, self.overwrites_unchanged, self.overwrites_suppressed
        ));
        if !self.skipped.is_empty() {
            lines.push(format!("Skipped: {}", self.skipped.join(", ")));
        }
        lines.join("\n")
    }
}

/// Reapplies the protective overwrite for every protected role on every
/// text and voice channel of the target guild
pub struct PermissionSynchronizer {
    cache: SnapshotCache,
    protected_role_ids: Vec<RoleId>,
    dry_run: bool,
    backup_path: Option<String>,
    roles: RwLock<HashMap<RoleId, RoleInfo>>,
    report: Mutex<SyncReport>,
}

impl PermissionSynchronizer {
    pub fn new(target: GuildTarget, member_limit: u64, config: &PermissionSyncConfig) -> Self {
        Self {
            cache: SnapshotCache::new(target, member_limit),
            protected_role_ids: config
                .protected_role_ids
                .iter()
                .map(|id| RoleId::new(*id))
                .collect(),
            dry_run: config.dry_run,
            backup_path: config.backup_path.clone(),
            roles: RwLock::new(HashMap::new()),
            report: Mutex::new(SyncReport::default()),
        }
    }

    pub fn report(&self) -> SyncReport {
        self.report.lock().clone()
    }

    /// Every protected role must exist; a missing one means misconfiguration
    fn resolve_protected_roles(&self) -> Result<Vec<RoleInfo>> {
        let roles = self.roles.read();
        self.protected_role_ids
            .iter()
            .map(|id| {
                roles
                    .get(id)
                    .cloned()
                    .ok_or(BotError::RoleNotFound { id: id.get() })
            })
            .collect()
    }

    async fn sync_channel(
        &self,
        platform: &dyn ChatPlatform,
        channel: &ChannelInfo,
        protected: &[RoleInfo],
    ) -> Result<()> {
        for role in protected {
            let (allow, deny) = channel
                .overwrite_for(role.id)
                .map(|o| (o.allow, o.deny))
                .unwrap_or((Permissions::empty(), Permissions::empty()));
            let (new_allow, new_deny) = protect_overwrite(allow, deny);

            debug!(
                "overwrites_for {} on {}: allow {:#b} deny {:#b} -> allow {:#b} deny {:#b}",
                role.name,
                channel.name,
                allow.bits(),
                deny.bits(),
                new_allow.bits(),
                new_deny.bits()
            );

            if (new_allow, new_deny) == (allow, deny) {
                self.report.lock().overwrites_unchanged += 1;
            } else if self.dry_run {
                info!(
                    "[dry run] would protect {} against {}",
                    channel.name, role.name
                );
                self.report.lock().overwrites_suppressed += 1;
            } else {
                platform
                    .set_role_overwrite(channel.id, role.id, new_allow, new_deny)
                    .await?;
                info!("Protected {} against {}", channel.name, role.name);
                self.report.lock().overwrites_written += 1;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GuildHooks for PermissionSynchronizer {
    async fn on_roles(&self, _platform: &dyn ChatPlatform, roles: &[RoleInfo]) -> Result<()> {
        info!("Manage all roles:");
        let mut index = self.roles.write();
        index.clear();
        for role in roles {
            info!(
                "{:16} \t {:25} \t {:#b}",
                role.name,
                role.id.get(),
                role.permissions.bits()
            );
            index.insert(role.id, role.clone());
        }
        Ok(())
    }

    async fn on_channels(&self, platform: &dyn ChatPlatform, channels: &[ChannelInfo]) -> Result<()> {
        let protected = self.resolve_protected_roles()?;

        if let Some(path) = &self.backup_path {
            let backup = {
                let roles = self.roles.read();
                PermissionBackup::capture(&self.cache.target().to_string(), roles.values(), channels)
            };
            backup.save(path).await?;
            info!("Saved permission backup to {}", path);
        }

        let mut ordered: Vec<&ChannelInfo> = channels.iter().collect();
        ordered.sort_by_key(|c| (c.position, c.id));

        info!("Manage all channels:");
        for channel in ordered {
            match channel.kind {
                ChannelKind::Category => {
                    info!("{} Category {} {}", "=".repeat(20), channel.name, "=".repeat(30));
                    self.report.lock().categories.push(channel.name.clone());
                }
                ChannelKind::Text | ChannelKind::Voice => {
                    info!("Channel {}", channel.name);
                    self.sync_channel(platform, channel, &protected).await?;
                    self.report.lock().channels_synced.push(channel.name.clone());
                }
                ChannelKind::Other => {
                    info!("{} Other {} {}", "=".repeat(20), channel.name, "=".repeat(30));
                    self.report.lock().skipped.push(channel.name.clone());
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl FeatureHandler for PermissionSynchronizer {
    fn name(&self) -> &'static str {
        "permission-sync"
    }

    fn runs_once(&self) -> bool {
        true
    }

    async fn on_connected(&self, platform: &dyn ChatPlatform) -> Result<()> {
        if self.dry_run {
            info!("Dry run: overwrites will be computed but not written");
        }
        *self.report.lock() = SyncReport::default();
        self.cache.refresh(platform, self).await?;
        info!("{}", self.report().format());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoleOverwrite;
    use crate::platform::fake::FakePlatform;
    use poise::serenity_prelude::ChannelId;

    const GUILD: u64 = 916300758834630666;

    fn channel(id: u64, name: &str, kind: ChannelKind, position: u16) -> ChannelInfo {
        ChannelInfo {
            id: ChannelId::new(id),
            name: name.to_string(),
            kind,
            position,
            overwrites: vec![],
        }
    }

    fn platform() -> FakePlatform {
        let mut general = channel(501, "general", ChannelKind::Text, 1);
        general.overwrites.push(RoleOverwrite {
            role_id: RoleId::new(10),
            allow: Permissions::MANAGE_CHANNELS | Permissions::SEND_MESSAGES,
            deny: Permissions::ATTACH_FILES,
        });

        FakePlatform::new()
            .with_guild(GUILD, "Real-UnknownDAO")
            .with_role(10, "builder")
            .with_role(11, "DAOer")
            .with_channel(channel(500, "Projects", ChannelKind::Category, 0))
            .with_channel(general)
            .with_channel(channel(502, "voice", ChannelKind::Voice, 2))
            .with_channel(channel(503, "forum", ChannelKind::Other, 3))
    }

    fn config(dry_run: bool) -> PermissionSyncConfig {
        PermissionSyncConfig {
            protected_role_ids: vec![10, 11],
            dry_run,
            backup_path: None,
        }
    }

    fn assert_protected(platform: &FakePlatform, channel_id: u64, role_id: u64) {
        let channel = platform.channel(channel_id).unwrap();
        let o = channel.overwrite_for(RoleId::new(role_id)).unwrap();
        assert!(o.deny.contains(PROTECTED_CAPABILITIES));
        assert!(!o.allow.intersects(PROTECTED_CAPABILITIES));
    }

    #[test]
    fn test_protect_overwrite_keeps_other_bits() {
        let (allow, deny) = protect_overwrite(
            Permissions::MANAGE_THREADS | Permissions::VIEW_CHANNEL,
            Permissions::SEND_MESSAGES,
        );
        assert_eq!(allow, Permissions::VIEW_CHANNEL);
        assert_eq!(deny, Permissions::SEND_MESSAGES | PROTECTED_CAPABILITIES);
    }

    #[tokio::test]
    async fn test_sync_protects_text_and_voice_channels() {
        let platform = platform();
        let sync = PermissionSynchronizer::new(GuildTarget::Id(GUILD), 3500, &config(false));

        sync.on_connected(&platform).await.unwrap();

        for channel_id in [501, 502] {
            for role_id in [10, 11] {
                assert_protected(&platform, channel_id, role_id);
            }
        }
        assert!(platform.channel(500).unwrap().overwrites.is_empty());
        assert!(platform.channel(503).unwrap().overwrites.is_empty());

        let general = platform.channel(501).unwrap();
        let builder = general.overwrite_for(RoleId::new(10)).unwrap();
        assert!(builder.allow.contains(Permissions::SEND_MESSAGES));
        assert!(builder.deny.contains(Permissions::ATTACH_FILES));

        let report = sync.report();
        assert_eq!(report.channels_synced, vec!["general", "voice"]);
        assert_eq!(report.categories, vec!["Projects"]);
        assert_eq!(report.skipped, vec!["forum"]);
        assert_eq!(report.overwrites_written, 4);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let platform = platform();
        let sync = PermissionSynchronizer::new(GuildTarget::Id(GUILD), 3500, &config(false));

        sync.on_connected(&platform).await.unwrap();
        let first: Vec<ChannelInfo> = platform.channels.lock().clone();
        let writes = platform.overwrite_writes();

        sync.on_connected(&platform).await.unwrap();
        assert_eq!(*platform.channels.lock(), first);
        assert_eq!(platform.overwrite_writes(), writes);
        assert_eq!(sync.report().overwrites_unchanged, 4);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let platform = platform();
        let sync = PermissionSynchronizer::new(GuildTarget::Id(GUILD), 3500, &config(true));

        sync.on_connected(&platform).await.unwrap();

        assert_eq!(platform.overwrite_writes(), 0);
        assert_eq!(sync.report().overwrites_suppressed, 4);
    }

    #[tokio::test]
    async fn test_missing_protected_role_is_fatal() {
        let platform = platform();
        let mut cfg = config(false);
        cfg.protected_role_ids.push(999);
        let sync = PermissionSynchronizer::new(GuildTarget::Id(GUILD), 3500, &cfg);

        let result = sync.on_connected(&platform).await;
        assert!(matches!(result, Err(BotError::RoleNotFound { id: 999 })));
        assert_eq!(platform.overwrite_writes(), 0);
    }

    #[tokio::test]
    async fn test_channels_processed_in_display_order() {
        let platform = FakePlatform::new()
            .with_guild(GUILD, "g")
            .with_role(10, "builder")
            .with_channel(channel(3, "third", ChannelKind::Text, 5))
            .with_channel(channel(1, "first", ChannelKind::Text, 0))
            .with_channel(channel(2, "second", ChannelKind::Voice, 2));
        let cfg = PermissionSyncConfig {
            protected_role_ids: vec![10],
            dry_run: false,
            backup_path: None,
        };
        let sync = PermissionSynchronizer::new(GuildTarget::Id(GUILD), 3500, &cfg);

        sync.on_connected(&platform).await.unwrap();
        assert_eq!(sync.report().channels_synced, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_backup_written_before_sync() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backup.json").to_string_lossy().to_string();
        let platform = platform();
        let mut cfg = config(false);
        cfg.backup_path = Some(path.clone());
        let sync = PermissionSynchronizer::new(GuildTarget::Id(GUILD), 3500, &cfg);

        sync.on_connected(&platform).await.unwrap();

        let backup: PermissionBackup =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let general = backup.channels.iter().find(|c| c.id == 501).unwrap();
        assert_eq!(
            general.overwrites[0].allow,
            (Permissions::MANAGE_CHANNELS | Permissions::SEND_MESSAGES).bits()
        );
        assert_eq!(backup.roles.len(), 2);
    }
}
