use poise::serenity_prelude as serenity;
use tracing::{debug, error, warn};

use crate::features::FeatureHandler;
use crate::models::IncomingMessage;
use crate::platform::serenity_platform::user_info;
use crate::platform::ChatPlatform;
use crate::{Data, Error};

/// Reduce a gateway message to what the features read
pub fn incoming_from(msg: &serenity::Message, bot_id: serenity::UserId) -> IncomingMessage {
    IncomingMessage {
        channel_id: msg.channel_id,
        author: user_info(&msg.author),
        content: msg.content.clone(),
        is_direct: msg.guild_id.is_none(),
        from_self: msg.author.id == bot_id,
    }
}

/// Handle incoming messages
pub async fn handle_message(
    _ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<(), Error> {
    let incoming = incoming_from(msg, data.bot_id);
    if incoming.from_self {
        return Ok(());
    }

    debug!(
        "Message from {} in {} ({})",
        incoming.author.tag(),
        incoming.channel_id,
        if incoming.is_direct { "DM" } else { "guild" }
    );
    dispatch_message(data.feature.as_ref(), data.platform.as_ref(), &incoming).await;
    Ok(())
}

/// Forward a message to the feature. Failures never stop the bot.
pub async fn dispatch_message(
    feature: &dyn FeatureHandler,
    platform: &dyn ChatPlatform,
    msg: &IncomingMessage,
) {
    if let Err(e) = feature.on_message(platform, msg).await {
        if e.is_user_facing() {
            warn!("[{}] {}", feature.name(), e);
        } else {
            error!(
                "[{}] Failed to handle message from {}: {}",
                feature.name(),
                msg.author.id,
                e
            );
        }
    }
}
