use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Discord guild automation: permission sync, claim distribution, DM relay, history dump
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the JSON config file
    #[arg(long, env = "GUILDKEEPER_CONFIG", default_value = "data/config.json")]
    config: String,

    /// Log at debug level
    #[arg(long, short = 'v')]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deny channel-management capabilities to protected roles on every channel, then exit
    SyncPermissions {
        /// Write overwrites instead of only reporting them
        #[arg(long)]
        apply: bool,
    },
    /// Hand out claim URLs to whitelisted members who DM a magic spell
    Claim,
    /// Forward DMs of the form `prefix|user|message` to another member
    Relay,
    /// Write channel history and the member list to local files, then exit
    Dump,
}

mod config;
mod error;
mod events;
mod features;
mod guild;
mod logging;
mod messages;
mod models;
mod platform;
mod state;

use config::{BotConfig, Whitelists};
use error::BotError;
use events::{handle_message, handle_ready};
use features::{ClaimDistributor, FeatureHandler, HistoricalDump, IndirectRelay, PermissionSynchronizer};
use platform::retry::RetryPolicy;
use platform::{ChatPlatform, SerenityPlatform};
use state::ClaimLedger;

type Error = Box<dyn std::error::Error + Send + Sync>;

/// Fatal error recorded by the Ready handler, read back once the client stops
pub type SharedFatal = Arc<parking_lot::Mutex<Option<BotError>>>;

/// Shared application state
pub struct Data {
    pub feature: Arc<dyn FeatureHandler>,
    pub platform: Arc<dyn ChatPlatform>,
    pub bot_id: serenity::UserId,
    pub fatal: SharedFatal,
}

async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            if let Err(e) = handle_ready(ctx, data_about_bot, framework, data).await {
                error!("Failed to handle ready: {}", e);
            }
        }
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = handle_message(ctx, new_message, data).await {
                error!("Failed to handle message: {}", e);
            }
        }
        _ => {}
    }
    Ok(())
}

/// Build the one feature this process runs
async fn build_feature(command: &Command, config: &BotConfig) -> Result<Arc<dyn FeatureHandler>> {
    let target = config.target_guild.clone();
    let member_limit = config.member_fetch_limit;

    let feature: Arc<dyn FeatureHandler> = match command {
        Command::SyncPermissions { apply } => {
            let mut sync_config = config.permission_sync.clone();
            if *apply {
                sync_config.dry_run = false;
            }
            Arc::new(PermissionSynchronizer::new(target, member_limit, &sync_config))
        }
        Command::Claim => {
            let whitelists = Whitelists::load(&config.claim.whitelists)?;
            info!("Loaded {} whitelist(s)", whitelists.len());

            let ledger = ClaimLedger::load(&config.claim.ledger_path).await?;
            info!(
                "Loaded claim ledger from {} ({} claims)",
                config.claim.ledger_path,
                ledger.claim_count()
            );
            Arc::new(ClaimDistributor::new(
                target,
                member_limit,
                config.claim.clone(),
                whitelists,
                ledger,
            ))
        }
        Command::Relay => Arc::new(IndirectRelay::new(target, member_limit, config.relay.clone())),
        Command::Dump => Arc::new(HistoricalDump::new(target, member_limit, config.dump.clone())),
    };
    Ok(feature)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();
    logging::init(args.verbose);

    info!("Loading configuration from {}...", args.config);
    let config = BotConfig::load_from_file(&args.config)?;
    info!("Target guild: {}", config.target_guild);

    let feature = build_feature(&args.command, &config).await?;
    info!("Feature: {}", feature.name());

    let token = std::env::var("DISCORD_TOKEN").context("Missing DISCORD_TOKEN environment variable")?;
    match logging::bot_id_from_token(&token) {
        Some(id) => info!(
            "Bot ID: {} (configure intents at https://discord.com/developers/applications/{}/bot)",
            id, id
        ),
        None => warn!("Could not decode the bot ID from DISCORD_TOKEN"),
    }

    let fatal: SharedFatal = Arc::new(parking_lot::Mutex::new(None));
    let retry = RetryPolicy::from(&config.retry);
    let guild_fetch_limit = config.guild_fetch_limit;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup({
            let fatal = fatal.clone();
            move |ctx, ready, _framework| {
                Box::pin(async move {
                    info!("Bot logged in as: {}", ready.user.name);
                    let platform = SerenityPlatform::new(ctx.http.clone(), retry, guild_fetch_limit);

                    Ok(Data {
                        feature,
                        platform: Arc::new(platform),
                        bot_id: ready.user.id,
                        fatal,
                    })
                })
            }
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged()
        | serenity::GatewayIntents::MESSAGE_CONTENT
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::DIRECT_MESSAGES;

    let privileged_intents: Vec<&str> = [
        (serenity::GatewayIntents::MESSAGE_CONTENT, "MESSAGE_CONTENT"),
        (serenity::GatewayIntents::GUILD_MEMBERS, "GUILD_MEMBERS"),
        (serenity::GatewayIntents::GUILD_PRESENCES, "GUILD_PRESENCES"),
    ]
    .into_iter()
    .filter(|(intent, _)| intents.contains(*intent))
    .map(|(_, name)| name)
    .collect();

    info!("Requesting privileged intents: {:?}", privileged_intents);

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await?;

    info!("Starting bot...");
    if let Err(e) = client.start().await {
        let err_str = e.to_string();
        if err_str.contains("Disallowed") || err_str.contains("intents") {
            error!("Failed to start bot: {}", e);
            error!("The following privileged intents need to be enabled in the Discord Developer Portal:");
            for intent in &privileged_intents {
                error!("  - {}", intent);
            }
            return Err(anyhow::anyhow!(
                "Disallowed gateway intents. Enable these in Discord Developer Portal: {:?}",
                privileged_intents
            ));
        }
        return Err(e.into());
    }

    if let Some(e) = fatal.lock().take() {
        error!("Stopped on fatal error: {}", e);
        return Err(e.into());
    }
    warn!("Bot ended.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let args = Args::parse_from(["guildkeeper", "--config", "cfg.json", "sync-permissions", "--apply"]);
        assert_eq!(args.config, "cfg.json");
        assert!(matches!(args.command, Command::SyncPermissions { apply: true }));

        let args = Args::parse_from(["guildkeeper", "-v", "relay"]);
        assert!(args.verbose);
        assert!(matches!(args.command, Command::Relay));
    }

    #[tokio::test]
    async fn test_build_feature_per_command() {
        let config: BotConfig =
            serde_json::from_str(r#"{"target_guild": 916300758834630666}"#).unwrap();

        for (command, name) in [
            (Command::SyncPermissions { apply: false }, "permission-sync"),
            (Command::Relay, "relay"),
            (Command::Dump, "dump"),
        ] {
            let feature = build_feature(&command, &config).await.unwrap();
            assert_eq!(feature.name(), name);
        }
    }

    #[tokio::test]
    async fn test_claim_feature_requires_readable_whitelists() {
        let mut config: BotConfig =
            serde_json::from_str(r#"{"target_guild": "Real-UnknownDAO"}"#).unwrap();
        config
            .claim
            .whitelists
            .insert("Alpha".to_string(), "/nonexistent/alpha.json".to_string());

        assert!(build_feature(&Command::Claim, &config).await.is_err());
    }
}
