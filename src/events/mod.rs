pub mod message;
pub mod ready;

pub use message::handle_message;
pub use ready::handle_ready;
