pub mod snapshot;

pub use snapshot::{GuildHooks, GuildSnapshot, SnapshotCache};
