//! CLI channel: interactive terminal-based chat.
//!
//! Reads lines from stdin, writes replies to stdout. Used by `parley chat`,
//! which runs the terminal through the same gateway as Discord.

use async_trait::async_trait;
use parley_core::channel::{Channel, ChannelId, ChannelMessage};
use parley_core::error::ChannelError;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, mpsc};

type Input = Box<dyn AsyncBufRead + Send + Unpin>;

/// Interactive CLI channel for terminal-based chat.
pub struct CliChannel {
    chat_id: ChannelId,
    author_name: String,
    input: Mutex<Option<Input>>,
}

impl CliChannel {
    pub fn new() -> Self {
        Self::from_reader(BufReader::new(io::stdin()))
    }

    /// Read lines from `reader` instead of stdin.
    pub fn from_reader(reader: impl AsyncBufRead + Send + Unpin + 'static) -> Self {
        let author_name = std::env::var("USER")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| "user".into());
        Self {
            chat_id: ChannelId::from("cli"),
            author_name,
            input: Mutex::new(Some(Box::new(reader))),
        }
    }

    pub fn with_author(mut self, author_name: impl Into<String>) -> Self {
        self.author_name = author_name.into();
        self
    }

    /// The single conversation a terminal session maps to.
    pub fn chat_id(&self) -> &ChannelId {
        &self.chat_id
    }
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Lines that end an interactive session.
pub fn is_exit_command(line: &str) -> bool {
    matches!(line, "exit" | "quit" | "/exit" | "/quit" | ":q")
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        let reader = self
            .input
            .lock()
            .await
            .take()
            .ok_or_else(|| ChannelError::ConnectionLost("CLI channel already started".into()))?;

        let (tx, rx) = mpsc::channel(32);
        let chat_id = self.chat_id.clone();
        let author_name = self.author_name.clone();

        tokio::spawn(async move {
            let mut lines = reader.lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim().to_string();
                        if line.is_empty() {
                            continue;
                        }
                        if is_exit_command(&line) {
                            break;
                        }

                        let msg = ChannelMessage::text("cli", chat_id.as_str(), author_name.as_str(), line);
                        if tx.send(Ok(msg)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF (Ctrl+D)
                    Err(e) => {
                        let _ = tx.send(Err(ChannelError::ConnectionLost(e.to_string()))).await;
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn send(&self, _chat_id: &ChannelId, content: &str) -> Result<(), ChannelError> {
        println!("{content}");
        Ok(())
    }

    fn max_message_len(&self) -> usize {
        usize::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_words() {
        for word in ["exit", "quit", "/exit", "/quit", ":q"] {
            assert!(is_exit_command(word));
        }
        assert!(!is_exit_command("exit now"));
        assert!(!is_exit_command("hello"));
    }

    #[tokio::test]
    async fn lines_become_messages_until_exit() {
        let input: &'static [u8] = b"hello\n\n  second line  \nquit\nnever seen\n";
        let ch = CliChannel::from_reader(input).with_author("alice");
        assert_eq!(ch.name(), "cli");

        let mut rx = ch.start().await.unwrap();
        let first = rx.recv().await.unwrap().unwrap();
        assert_eq!(first.content, "hello");
        assert_eq!(first.author_name, "alice");
        assert_eq!(first.channel_id.as_str(), "cli");
        assert!(first.mentions_bot);

        let second = rx.recv().await.unwrap().unwrap();
        assert_eq!(second.content, "second line");

        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn cannot_start_twice() {
        let input: &'static [u8] = b"";
        let ch = CliChannel::from_reader(input);
        let _rx = ch.start().await.unwrap();
        assert!(ch.start().await.is_err());
    }
}
