//! Message domain types.
//!
//! These are the value objects that flow through the entire system:
//! a chat user posts → the channel adapter builds a `Message` → the agent
//! records it in memory → the language model sees it as part of the history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Process-wide creation counter; gives messages a strict order even when
/// two of them share a wall-clock timestamp.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn next_sequence() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A chat participant
    User,
    /// The assistant (model answers and tool observations)
    Assistant,
}

/// One part of a message's content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text { text: String },

    /// Raw image bytes with their MIME type.
    Image { mime_type: String, data: Vec<u8> },

    /// An image that still lives behind a URL. Channel adapters resolve
    /// these into [`ContentPart::Image`] before the turn reaches the agent.
    ImageUrl {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        ContentPart::Image {
            mime_type: mime_type.into(),
            data,
        }
    }

    /// The text of this part, if it is a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, ContentPart::Image { .. } | ContentPart::ImageUrl { .. })
    }
}

/// A single turn in a conversation.
///
/// Messages are never edited after construction; memory only appends and
/// evicts whole messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// Display name of the chat participant (user turns only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Ordered content parts
    pub contents: Vec<ContentPart>,

    /// Wall-clock creation time
    pub timestamp: DateTime<Utc>,

    /// Monotonic creation order within this process
    pub sequence: u64,
}

impl Message {
    /// Create a message from explicit parts.
    pub fn new(role: Role, author: Option<String>, contents: Vec<ContentPart>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            author,
            contents,
            timestamp: Utc::now(),
            sequence: next_sequence(),
        }
    }

    /// Create a text-only user message attributed to `author`.
    pub fn user(author: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(
            Role::User,
            Some(author.into()),
            vec![ContentPart::text(content)],
        )
    }

    /// Create a user message with text followed by image parts.
    ///
    /// An empty `text` contributes no part, so an image-only turn carries
    /// just its images.
    pub fn user_with_images(
        author: impl Into<String>,
        text: impl Into<String>,
        images: Vec<ContentPart>,
    ) -> Self {
        let text = text.into();
        let mut contents = Vec::with_capacity(images.len() + 1);
        if !text.is_empty() {
            contents.push(ContentPart::Text { text });
        }
        contents.extend(images);
        Self::new(Role::User, Some(author.into()), contents)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, None, vec![ContentPart::text(content)])
    }

    /// Concatenated text of every text part, newline-separated.
    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Whether the message has no content parts at all.
    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Text as the model should see it: user turns are prefixed with the
    /// author's name so the model can tell participants apart.
    pub fn attributed_text(&self, text: &str) -> String {
        match (&self.role, &self.author) {
            (Role::User, Some(author)) if !author.is_empty() => format!("{author}: {text}"),
            _ => text.to_string(),
        }
    }

    /// Number of image parts.
    pub fn image_count(&self) -> usize {
        self.contents.iter().filter(|p| p.is_image()).count()
    }
}
