//! The conversational agent: the heart of Parley.
//!
//! Each chat channel gets an [`Agent`] that owns a bounded conversation
//! memory and answers one message at a time:
//!
//! 1. **Record** the user's message
//! 2. **Generate** with the whole window and a system prompt listing the tools
//! 3. **If the model wrote a tool directive**: run that one tool, record the
//!    observation, and ask the model once more
//! 4. **Return** the final answer and record it
//!
//! [`AgentRegistry`] maps channels to agents and creates them on demand.

pub mod agent;
pub mod directive;
pub mod prompt;
pub mod registry;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use agent::Agent;
pub use directive::{ToolDirective, parse_directive};
pub use prompt::{DEFAULT_TEMPLATE, render_system_prompt};
pub use registry::{AgentRegistry, SharedAgent};
