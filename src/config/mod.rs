pub mod bot_config;
pub mod whitelist;

pub use bot_config::{
    BotConfig, ClaimConfig, DumpConfig, GuildTarget, PermissionSyncConfig, RelayConfig,
    RetryConfig,
};
pub use whitelist::{Claimable, Whitelists};
