//! Chat channel implementations for Parley.
//!
//! Each channel connects to a chat platform and relays messages to/from
//! the gateway. Available channels:
//! - **Discord**: Gateway WebSocket for inbound messages, REST for replies
//! - **CLI**: Interactive terminal chat (stdin/stdout)
//!
//! Also here: splitting long replies to fit a platform's limit, and
//! turning image attachments into bytes the model can read.

pub mod attachments;
pub mod chunk;
pub mod cli;
pub mod discord;

pub use attachments::AttachmentResolver;
pub use chunk::split_long_text;
pub use cli::CliChannel;
pub use discord::DiscordChannel;
