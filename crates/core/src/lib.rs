//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley chat agent.
//! This crate has **no I/O of its own**: it defines the domain model that
//! every other crate implements against.
//!
//! ## Layout
//!
//! - [`message`]: immutable conversation turns made of text/image parts
//! - [`memory`]: the bounded per-channel sliding window of turns
//! - [`tool`]: the `Tool` trait and the name-keyed registry
//! - [`provider`]: the `LanguageModel` trait and per-agent model sessions
//! - [`channel`]: the chat-platform adapter trait and inbound message type

pub mod channel;
pub mod error;
pub mod memory;
pub mod message;
pub mod provider;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use channel::{Attachment, Channel, ChannelId, ChannelMessage};
pub use error::{Error, Result};
pub use memory::ConversationMemory;
pub use message::{ContentPart, Message, Role};
pub use provider::{LanguageModel, ModelRequest, ModelResponse, ModelSession, Usage};
pub use tool::{Tool, ToolRegistry};
