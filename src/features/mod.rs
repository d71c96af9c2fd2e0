pub mod claim;
pub mod history_dump;
pub mod permission_sync;
pub mod relay;

use async_trait::async_trait;
use dashmap::DashMap;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

use crate::error::Result;
use crate::models::IncomingMessage;
use crate::platform::ChatPlatform;

pub use claim::ClaimDistributor;
pub use history_dump::HistoricalDump;
pub use permission_sync::PermissionSynchronizer;
pub use relay::IndirectRelay;

/// The single feature a bot process runs. The event dispatcher owns one of
/// these and forwards connection and message events to it.
#[async_trait]
pub trait FeatureHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Batch features stop the client once `on_connected` returns
    fn runs_once(&self) -> bool {
        false
    }

    async fn on_connected(&self, platform: &dyn ChatPlatform) -> Result<()>;

    async fn on_message(&self, _platform: &dyn ChatPlatform, _msg: &IncomingMessage) -> Result<()> {
        Ok(())
    }
}

/// Serializes message handling per author while letting different authors
/// proceed concurrently
#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<serenity::UserId, Arc<tokio::sync::Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, user_id: serenity::UserId) -> SessionGuard<'_> {
        let lock = self
            .locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        SessionGuard {
            locks: &self.locks,
            user_id,
            guard: Some(lock.lock_owned().await),
        }
    }
}

/// Held while one author's message is handled. The author's entry is
/// removed on release once no other task holds or waits for it.
pub struct SessionGuard<'a> {
    locks: &'a DashMap<serenity::UserId, Arc<tokio::sync::Mutex<()>>>,
    user_id: serenity::UserId,
    guard: Option<tokio::sync::OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.user_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
