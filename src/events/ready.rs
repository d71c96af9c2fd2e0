use poise::serenity_prelude as serenity;
use tracing::{error, info};

use crate::error::BotError;
use crate::features::FeatureHandler;
use crate::platform::ChatPlatform;
use crate::{Data, Error};

/// What the client should do once the feature has processed a connection
#[derive(Debug)]
pub enum ReadyOutcome {
    KeepRunning,
    Finished,
    Failed(BotError),
}

impl ReadyOutcome {
    pub fn stops_client(&self) -> bool {
        !matches!(self, ReadyOutcome::KeepRunning)
    }
}

pub async fn run_connected(feature: &dyn FeatureHandler, platform: &dyn ChatPlatform) -> ReadyOutcome {
    info!("Running {} on connect", feature.name());
    match feature.on_connected(platform).await {
        Ok(()) if feature.runs_once() => {
            info!("{} finished", feature.name());
            ReadyOutcome::Finished
        }
        Ok(()) => ReadyOutcome::KeepRunning,
        Err(e) => {
            error!("{} failed: {}", feature.name(), e);
            ReadyOutcome::Failed(e)
        }
    }
}

/// Handle a new gateway session
pub async fn handle_ready(
    _ctx: &serenity::Context,
    ready: &serenity::Ready,
    framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    info!("{} is connected!", ready.user.name);

    let outcome = run_connected(data.feature.as_ref(), data.platform.as_ref()).await;
    if !outcome.stops_client() {
        return Ok(());
    }
    if let ReadyOutcome::Failed(e) = outcome {
        *data.fatal.lock() = Some(e);
    }

    info!("Shutting down");
    framework.shard_manager().shutdown_all().await;
    Ok(())
}
