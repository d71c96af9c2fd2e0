use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{BotError, Result};

/// How the target guild is identified
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GuildTarget {
    /// Stable numeric guild ID (preferred)
    Id(u64),
    /// Display name; breaks on renames and collides on duplicates
    Name(String),
}

impl std::fmt::Display for GuildTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuildTarget::Id(id) => write!(f, "{}", id),
            GuildTarget::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Top-level bot configuration
/// Loaded from data/config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    pub target_guild: GuildTarget,

    /// Upper bound on members fetched per snapshot
    #[serde(default = "default_member_fetch_limit")]
    pub member_fetch_limit: u64,

    /// Upper bound on guilds listed when locating the target
    #[serde(default = "default_guild_fetch_limit")]
    pub guild_fetch_limit: u64,

    #[serde(default)]
    pub permission_sync: PermissionSyncConfig,

    #[serde(default)]
    pub claim: ClaimConfig,

    #[serde(default)]
    pub relay: RelayConfig,

    #[serde(default)]
    pub dump: DumpConfig,

    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_member_fetch_limit() -> u64 {
    3500
}

fn default_guild_fetch_limit() -> u64 {
    150
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionSyncConfig {
    /// Roles that must never manage channels, permissions or threads
    #[serde(default)]
    pub protected_role_ids: Vec<u64>,

    /// Compute overwrites without writing them
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Where to save a JSON backup of roles and overwrites before syncing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
}

impl Default for PermissionSyncConfig {
    fn default() -> Self {
        Self {
            protected_role_ids: Vec::new(),
            dry_run: true,
            backup_path: None,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClaimConfig {
    /// Messages starting with any of these trigger a claim
    #[serde(default = "default_magic_spells")]
    pub magic_spells: Vec<String>,

    #[serde(default)]
    pub tutorial_link: String,

    /// Tag or numeric ID of the only user allowed to run the stat spell
    #[serde(default)]
    pub admin_identity: String,

    #[serde(default = "default_stat_spell")]
    pub stat_spell: String,

    /// Members mentioned by the stat spell (ID, name#tag, or bare name)
    #[serde(default)]
    pub mention_identities: Vec<String>,

    /// Public channel for mentions and whitelist announcements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub announce_channel_id: Option<u64>,

    /// Mention whitelisted members once the snapshot is ready
    #[serde(default)]
    pub announce_on_connect: bool,

    #[serde(default)]
    pub announce_skip_projects: Vec<String>,

    /// Also accept claims posted in guild channels
    #[serde(default)]
    pub allow_guild_channels: bool,

    /// Project name -> whitelist file path
    #[serde(default)]
    pub whitelists: BTreeMap<String, String>,

    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            magic_spells: default_magic_spells(),
            tutorial_link: String::new(),
            admin_identity: String::new(),
            stat_spell: default_stat_spell(),
            mention_identities: Vec::new(),
            announce_channel_id: None,
            announce_on_connect: false,
            announce_skip_projects: Vec::new(),
            allow_guild_channels: false,
            whitelists: BTreeMap::new(),
            ledger_path: default_ledger_path(),
        }
    }
}

fn default_magic_spells() -> Vec<String> {
    vec!["WhereIsMyPOAP".to_string()]
}

fn default_stat_spell() -> String {
    "Check it out".to_string()
}

fn default_ledger_path() -> String {
    "state/claims.json".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    #[serde(default = "default_relay_prefix")]
    pub prefix: String,

    #[serde(default = "default_relay_delimiter")]
    pub delimiter: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            prefix: default_relay_prefix(),
            delimiter: default_relay_delimiter(),
        }
    }
}

fn default_relay_prefix() -> String {
    "IndirectMsg".to_string()
}

fn default_relay_delimiter() -> String {
    "|".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumpConfig {
    #[serde(default)]
    pub channel_ids: Vec<u64>,

    #[serde(default = "default_history_limit")]
    pub history_limit: u64,

    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for DumpConfig {
    fn default() -> Self {
        Self {
            channel_ids: Vec::new(),
            history_limit: default_history_limit(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_history_limit() -> u64 {
    5000
}

fn default_output_dir() -> String {
    "historical_msgs".to_string()
}

/// Bounded retry with exponential backoff for transient Discord failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_elapsed_secs")]
    pub max_elapsed_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_elapsed_secs: default_max_elapsed_secs(),
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_elapsed(&self) -> Duration {
        Duration::from_secs(self.max_elapsed_secs)
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_elapsed_secs() -> u64 {
    30
}

impl BotConfig {
    /// Load from a JSON file and validate
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BotError::ConfigLoad {
            path: path.to_string(),
            source: e,
        })?;

        let config: BotConfig =
            serde_json::from_str(&content).map_err(|e| BotError::ConfigParse {
                path: path.to_string(),
                source: e,
            })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.member_fetch_limit == 0 || self.guild_fetch_limit == 0 {
            return Err(invalid("fetch limits must be greater than zero"));
        }
        if self.claim.magic_spells.iter().all(|s| s.is_empty()) {
            return Err(invalid("claim.magic_spells must contain a non-empty spell"));
        }
        if self.relay.prefix.is_empty() || self.relay.delimiter.is_empty() {
            return Err(invalid("relay.prefix and relay.delimiter must not be empty"));
        }
        if self.dump.history_limit == 0 {
            return Err(invalid("dump.history_limit must be greater than zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> BotError {
    BotError::ConfigValidation {
        message: message.to_string(),
    }
}
