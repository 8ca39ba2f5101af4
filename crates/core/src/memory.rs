//! Conversation memory: the bounded sliding window of recent turns.
//!
//! Each chat channel gets one `ConversationMemory`. It keeps at most
//! `window_size` messages; appending past the limit evicts from the head,
//! oldest first. Nothing is ever reordered, summarized, or persisted.

use std::collections::VecDeque;
use tracing::debug;

use crate::message::Message;

/// Per-channel FIFO history with a fixed window.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    window_size: usize,
    history: VecDeque<Message>,
}

impl ConversationMemory {
    /// Create an empty memory.
    ///
    /// A `window_size` of zero is raised to one; the configuration layer
    /// rejects zero before it gets here.
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            history: VecDeque::with_capacity(window_size),
        }
    }

    /// Append a message, evicting from the head until the window fits.
    ///
    /// A message with no content parts is dropped instead of stored.
    /// Returns whether the message was stored.
    pub fn add_message(&mut self, message: Message) -> bool {
        if message.is_empty() {
            debug!(message_id = %message.id, "Dropping empty turn");
            return false;
        }
        self.history.push_back(message);
        while self.history.len() > self.window_size {
            self.history.pop_front();
        }
        true
    }

    /// Snapshot of the full history, oldest first.
    pub fn history(&self) -> Vec<Message> {
        self.history.iter().cloned().collect()
    }

    /// The history that would result from appending `pending`, without
    /// mutating this memory.
    ///
    /// Applies the same empty-turn filtering and eviction as
    /// [`add_message`](Self::add_message).
    pub fn preview_with(&self, pending: &[Message]) -> Vec<Message> {
        let mut preview = self.clone();
        for message in pending {
            preview.add_message(message.clone());
        }
        preview.history()
    }

    /// Borrowing iterator over the history, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.history.iter()
    }

    /// Most recently stored message.
    pub fn last(&self) -> Option<&Message> {
        self.history.back()
    }

    /// Drop all history.
    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Message, Role};

    fn numbered(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::user("u", format!("msg {i}"))).collect()
    }

    #[test]
    fn keeps_last_n_in_order() {
        let mut memory = ConversationMemory::new(3);
        for msg in numbered(7) {
            assert!(memory.add_message(msg));
        }
        let texts: Vec<String> = memory.history().iter().map(Message::text).collect();
        assert_eq!(texts, vec!["msg 4", "msg 5", "msg 6"]);
    }

    #[test]
    fn under_window_keeps_everything() {
        let mut memory = ConversationMemory::new(20);
        for msg in numbered(5) {
            memory.add_message(msg);
        }
        assert_eq!(memory.len(), 5);
        assert_eq!(memory.history()[0].text(), "msg 0");
    }

    #[test]
    fn clear_then_add_behaves_as_fresh() {
        let mut memory = ConversationMemory::new(2);
        for msg in numbered(4) {
            memory.add_message(msg);
        }
        memory.clear();
        assert!(memory.history().is_empty());

        memory.add_message(Message::assistant("again"));
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.history()[0].role, Role::Assistant);
    }

    #[test]
    fn empty_turn_is_dropped() {
        let mut memory = ConversationMemory::new(4);
        let empty = Message::user_with_images("u", "", vec![]);
        assert!(!memory.add_message(empty));
        assert!(memory.is_empty());
    }

    #[test]
    fn snapshot_is_detached() {
        let mut memory = ConversationMemory::new(4);
        memory.add_message(Message::user("u", "one"));
        let mut snapshot = memory.history();
        snapshot.push(Message::user("u", "smuggled"));
        assert_eq!(memory.len(), 1);
    }

    #[test]
    fn preview_matches_commit_without_mutating() {
        let mut memory = ConversationMemory::new(2);
        memory.add_message(Message::user("u", "a"));
        memory.add_message(Message::user("u", "b"));

        let pending = vec![Message::assistant("c")];
        let preview = memory.preview_with(&pending);
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.history()[0].text(), "a");

        for msg in pending {
            memory.add_message(msg);
        }
        let committed: Vec<String> = memory.history().iter().map(Message::text).collect();
        let previewed: Vec<String> = preview.iter().map(Message::text).collect();
        assert_eq!(committed, previewed);
    }

    #[test]
    fn zero_window_is_raised_to_one() {
        let mut memory = ConversationMemory::new(0);
        assert_eq!(memory.window_size(), 1);
        for msg in numbered(3) {
            memory.add_message(msg);
        }
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.last().map(Message::text).as_deref(), Some("msg 2"));
    }
}
