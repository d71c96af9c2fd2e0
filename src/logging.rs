//! Tracing setup shared by every subcommand.

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub fn level_for(verbose: bool) -> LevelFilter {
    if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    }
}

/// Install the global subscriber: formatted output with target and level
pub fn init(verbose: bool) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true),
        )
        .with(level_for(verbose))
        .init();
}

/// The application ID encoded in the first segment of a bot token.
/// Only this part of the token is ever safe to log.
pub fn bot_id_from_token(token: &str) -> Option<String> {
    use base64::Engine;

    let segment = token.split('.').next()?;
    base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(segment)
        .or_else(|_| base64::engine::general_purpose::URL_SAFE_NO_PAD.decode(segment))
        .ok()
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .filter(|id| id.chars().all(|c| c.is_ascii_digit()))
}
