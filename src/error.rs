use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    // Configuration errors
    #[error("Failed to load config file '{path}': {source}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {message}")]
    ConfigValidation { message: String },

    #[error("Failed to load whitelist '{project}' from '{path}': {message}")]
    WhitelistLoad {
        project: String,
        path: String,
        message: String,
    },

    #[error("Guild not found: {target}, available: [{available}]")]
    GuildNotFound { target: String, available: String },

    #[error("Protected role {id} not found in guild roles")]
    RoleNotFound { id: u64 },

    #[error("Channel not found: {id}")]
    ChannelNotFound { id: u64 },

    // User-facing errors
    #[error("{message}")]
    Format { message: String },

    #[error("{target} not found in guild {guild}")]
    MemberNotFound { target: String, guild: String },

    #[error("{target} matches {count} members in guild {guild}, please use the numeric user ID")]
    AmbiguousMember {
        target: String,
        guild: String,
        count: usize,
    },

    #[error("{user} is not a valid user to claim")]
    NotWhitelisted { user: String },

    // Discord errors
    #[error("Discord API error during {operation}: {message}")]
    Transport { operation: String, message: String },

    // State errors
    #[error("Failed to save state to '{path}': {source}")]
    StateSave {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load state from '{path}': {source}")]
    StateLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse state file '{path}': {source}")]
    StateParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write dump file '{path}': {source}")]
    DumpWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode dump file '{path}': {message}")]
    DumpEncode { path: String, message: String },

    // Generic errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl BotError {
    /// Errors that are reported back to the requesting user instead of
    /// aborting the run.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            BotError::Format { .. }
                | BotError::MemberNotFound { .. }
                | BotError::AmbiguousMember { .. }
                | BotError::NotWhitelisted { .. }
        )
    }

    pub fn format(message: impl Into<String>) -> Self {
        BotError::Format {
            message: message.into(),
        }
    }
}

impl From<serenity::Error> for BotError {
    fn from(err: serenity::Error) -> Self {
        BotError::Transport {
            operation: "request".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Internal {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BotError>;
