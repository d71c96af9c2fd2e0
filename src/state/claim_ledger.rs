use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{BotError, Result};

/// Keyed store of delivered claims: user ID -> project -> record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimLedger {
    /// Schema version
    pub version: u32,

    pub last_updated: DateTime<Utc>,

    pub claims: HashMap<String, HashMap<String, ClaimRecord>>,
}

impl Default for ClaimLedger {
    fn default() -> Self {
        Self {
            version: 1,
            last_updated: Utc::now(),
            claims: HashMap::new(),
        }
    }
}

/// One project claimed by one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub user_id: String,
    pub user_tag: String,
    pub project: String,
    pub url: String,
    pub first_claimed_at: DateTime<Utc>,
    pub last_claimed_at: DateTime<Utc>,
    /// Times the URL was delivered, re-claims included
    pub claim_count: u32,
}

impl ClaimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file, or start empty if it doesn't exist
    pub async fn load(path: &str) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).map_err(|e| BotError::StateParse {
                path: path.to_string(),
                source: e,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(BotError::StateLoad {
                path: path.to_string(),
                source: e,
            }),
        }
    }

    /// Save to a JSON file atomically
    pub async fn save(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;

        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| BotError::StateSave {
                        path: path.to_string(),
                        source: e,
                    })?;
            }
        }

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

    /// Record a delivered claim. Returns true for a first-time claim.
    pub fn record(&mut self, user_id: &str, user_tag: &str, project: &str, url: &str) -> bool {
        let now = Utc::now();
        self.last_updated = now;

        let projects = self.claims.entry(user_id.to_string()).or_default();
        match projects.get_mut(project) {
            Some(existing) => {
                existing.last_claimed_at = now;
                existing.claim_count += 1;
                existing.user_tag = user_tag.to_string();
                existing.url = url.to_string();
                false
            }
            None => {
                projects.insert(
                    project.to_string(),
                    ClaimRecord {
                        user_id: user_id.to_string(),
                        user_tag: user_tag.to_string(),
                        project: project.to_string(),
                        url: url.to_string(),
                        first_claimed_at: now,
                        last_claimed_at: now,
                        claim_count: 1,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, user_id: &str, project: &str) -> Option<&ClaimRecord> {
        self.claims.get(user_id).and_then(|p| p.get(project))
    }

    /// Number of distinct (user, project) claims
    pub fn claim_count(&self) -> usize {
        self.claims.values().map(|p| p.len()).sum()
    }
}

pub type SharedClaimLedger = Arc<tokio::sync::RwLock<ClaimLedger>>;

pub fn create_shared_claim_ledger(ledger: ClaimLedger) -> SharedClaimLedger {
    Arc::new(tokio::sync::RwLock::new(ledger))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_first_and_repeat_claim() {
        let mut ledger = ClaimLedger::new();

        assert!(ledger.record("111", "alice#0001", "Alpha", "urlA"));
        assert!(!ledger.record("111", "alice#0001", "Alpha", "urlA"));
        assert!(ledger.record("111", "alice#0001", "Beta", "urlB"));

        let record = ledger.get("111", "Alpha").unwrap();
        assert_eq!(record.claim_count, 2);
        assert_eq!(record.url, "urlA");
        assert!(record.last_claimed_at >= record.first_claimed_at);
        assert_eq!(ledger.claim_count(), 2);
        assert!(ledger.get("222", "Alpha").is_none());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("claims.json");
        let path = path.to_string_lossy().to_string();

        let mut ledger = ClaimLedger::new();
        ledger.record("111", "alice", "Alpha", "urlA");
        ledger.save(&path).await.unwrap();

        let loaded = ClaimLedger::load(&path).await.unwrap();
        assert_eq!(loaded.get("111", "Alpha"), ledger.get("111", "Alpha"));
        assert!(!std::path::Path::new(&format!("{}.tmp", path)).exists());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_is_state_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claims.json");
        std::fs::write(&path, "{ not json").unwrap();

        let result = ClaimLedger::load(&path.to_string_lossy()).await;
        assert!(matches!(result, Err(BotError::StateParse { .. })));
    }

    #[tokio::test]
    async fn test_load_missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.json");
        let ledger = ClaimLedger::load(&path.to_string_lossy()).await.unwrap();
        assert_eq!(ledger.claim_count(), 0);
    }
}
