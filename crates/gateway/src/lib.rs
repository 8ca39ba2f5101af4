//! Message gateway for Parley.
//!
//! Sits between a chat [`Channel`] and the per-channel agents. Each chat
//! channel gets its own queue, drained by one task, and every message in
//! it goes through:
//!
//! 1. Drop messages with neither text nor images
//! 2. Handle `!reset` without asking the model
//! 3. Show a typing indicator and lock the channel's agent
//! 4. Run the turn under a deadline and the shutdown signal
//! 5. Split the answer to the channel's limit and send it, chunk by chunk
//!
//! Turns in different channels run concurrently. Turns in one channel run
//! one at a time, in arrival order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parley_agent::AgentRegistry;
use parley_channels::{AttachmentResolver, split_long_text};
use parley_config::AppConfig;
use parley_core::channel::{Channel, ChannelId, ChannelMessage};
use parley_core::error::{ChannelError, Error};
use parley_core::message::Message;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Sent in place of an answer when a turn fails.
pub const APOLOGY: &str =
    "Sorry! Something went wrong while processing your request. Please try again later.";

pub const RESET_COMMAND: &str = "!reset";
pub const RESET_REPLY: &str = "Conversation history cleared.";

/// Timing knobs for the dispatcher.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Deadline for one whole turn, tool call and follow-up included
    pub turn_timeout: Duration,
    /// Pause between consecutive chunks of one reply
    pub chunk_delay: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(60),
            chunk_delay: Duration::from_millis(500),
        }
    }
}

impl GatewaySettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            turn_timeout: Duration::from_secs(config.agent.turn_timeout_secs),
            chunk_delay: Duration::from_millis(config.discord.chunk_delay_ms),
        }
    }
}

/// What became of one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to answer
    Ignored,
    /// Memory cleared on request
    Reset,
    /// Answer delivered; `sent` of `chunks` chunks made it out
    Replied { chunks: usize, sent: usize },
    /// The model produced an empty answer; nothing was sent
    Empty,
    /// The turn failed and the apology was sent (or attempted)
    Failed,
}

/// Connects one channel to the agent registry.
pub struct Gateway {
    channel: Arc<dyn Channel>,
    agents: AgentRegistry,
    attachments: AttachmentResolver,
    settings: GatewaySettings,
    shutdown: CancellationToken,
}

impl Gateway {
    pub fn new(
        channel: Arc<dyn Channel>,
        agents: AgentRegistry,
        attachments: AttachmentResolver,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            channel,
            agents,
            attachments,
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use an externally owned shutdown token (e.g. tied to Ctrl-C).
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn with_settings(mut self, settings: GatewaySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    /// Start the channel and dispatch messages until it closes or shutdown
    /// is signalled. Messages are queued per chat channel; on exit the
    /// queues are closed and their in-flight turns awaited (they observe
    /// the same shutdown signal) before the channel is stopped.
    pub async fn run(self: Arc<Self>) -> Result<(), ChannelError> {
        let mut inbound = self.channel.start().await?;
        info!(channel = self.channel.name(), "Gateway listening");

        let mut queues: HashMap<ChannelId, mpsc::UnboundedSender<ChannelMessage>> = HashMap::new();
        let mut workers = JoinSet::new();
        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = inbound.recv() => next,
            };

            match next {
                Some(Ok(msg)) => {
                    let channel_id = msg.channel_id.clone();
                    let queue = queues
                        .entry(channel_id.clone())
                        .or_insert_with(|| self.spawn_queue(channel_id.clone(), &mut workers));
                    if let Err(mpsc::error::SendError(msg)) = queue.send(msg) {
                        warn!(%channel_id, "Channel queue closed, restarting it");
                        let fresh = self.spawn_queue(channel_id.clone(), &mut workers);
                        if fresh.send(msg).is_err() {
                            error!(%channel_id, "Dropping message, channel queue unavailable");
                        }
                        *queue = fresh;
                    }
                }
                Some(Err(e)) => warn!(channel = self.channel.name(), error = %e, "Channel error"),
                None => {
                    info!(channel = self.channel.name(), "Channel closed");
                    break;
                }
            }

            while let Some(done) = workers.try_join_next() {
                if let Err(e) = done {
                    error!(error = %e, "Channel queue task panicked");
                }
            }
        }

        drop(queues);
        while let Some(done) = workers.join_next().await {
            if let Err(e) = done {
                error!(error = %e, "Channel queue task panicked");
            }
        }

        self.channel.stop().await
    }

    /// Spawn the task that handles one chat channel's messages in order.
    /// It ends when the sender is dropped or shutdown is signalled; queued
    /// messages not yet started are dropped on shutdown.
    fn spawn_queue(
        self: &Arc<Self>,
        channel_id: ChannelId,
        workers: &mut JoinSet<()>,
    ) -> mpsc::UnboundedSender<ChannelMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gateway = Arc::clone(self);
        debug!(%channel_id, "Opening channel queue");
        workers.spawn(async move {
            loop {
                let msg = tokio::select! {
                    biased;
                    _ = gateway.shutdown.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };
                gateway.handle_message(msg).await;
            }
            debug!(%channel_id, "Channel queue closed");
        });
        tx
    }

    /// Handle one inbound message end to end.
    ///
    /// Ordering within a channel is the caller's job; [`Gateway::run`]
    /// never has two of these in flight for the same channel.
    pub async fn handle_message(&self, msg: ChannelMessage) -> Outcome {
        if msg.is_blank() {
            debug!(channel_id = %msg.channel_id, "Dropping blank message");
            return Outcome::Ignored;
        }

        let text = msg.content.trim();
        if text == RESET_COMMAND {
            return self.reset(&msg).await;
        }

        let images = self.attachments.resolve(&msg.attachments).await;
        if text.is_empty() && images.is_empty() {
            debug!(channel_id = %msg.channel_id, "No text and no usable images");
            return Outcome::Ignored;
        }

        if let Err(e) = self.channel.send_typing(&msg.channel_id).await {
            warn!(channel_id = %msg.channel_id, error = %e, "Typing indicator failed");
        }

        let agent = self.agents.get_or_create(&msg.channel_id).await;
        // Held until the reply is out, so one channel's replies never interleave.
        let mut agent = agent.lock().await;

        let message = Message::user_with_images(msg.author_name.as_str(), text, images);
        let cancel = self.shutdown.child_token();
        let result = match tokio::time::timeout(
            self.settings.turn_timeout,
            agent.respond(message, &cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                cancel.cancel();
                Err(Error::Cancelled(format!(
                    "turn exceeded {}s",
                    self.settings.turn_timeout.as_secs()
                )))
            }
        };

        match result {
            Ok(answer) if answer.trim().is_empty() => {
                warn!(channel_id = %msg.channel_id, "Model returned an empty answer");
                Outcome::Empty
            }
            Ok(answer) => self.deliver(&msg, &answer).await,
            Err(e) => {
                error!(channel_id = %msg.channel_id, error = %e, "Turn failed");
                if let Err(e) = self.channel.send(&msg.channel_id, APOLOGY).await {
                    error!(channel_id = %msg.channel_id, error = %e, "Failed to send apology");
                }
                Outcome::Failed
            }
        }
    }

    async fn reset(&self, msg: &ChannelMessage) -> Outcome {
        if let Some(agent) = self.agents.get(&msg.channel_id).await {
            agent.lock().await.reset();
        }
        info!(channel_id = %msg.channel_id, "Conversation reset");
        if let Err(e) = self.channel.send(&msg.channel_id, RESET_REPLY).await {
            warn!(channel_id = %msg.channel_id, error = %e, "Failed to confirm reset");
        }
        Outcome::Reset
    }

    async fn deliver(&self, msg: &ChannelMessage, answer: &str) -> Outcome {
        let chunks = split_long_text(answer, self.channel.max_message_len());
        let total = chunks.len();
        let mut sent = 0;

        for (i, chunk) in chunks.iter().enumerate() {
            if let Err(e) = self.channel.send(&msg.channel_id, chunk).await {
                error!(
                    channel_id = %msg.channel_id,
                    chunk = i + 1,
                    total,
                    error = %e,
                    "Failed to send reply chunk"
                );
                break;
            }
            sent += 1;
            if i + 1 < total && !self.settings.chunk_delay.is_zero() {
                tokio::time::sleep(self.settings.chunk_delay).await;
            }
        }

        info!(channel_id = %msg.channel_id, chunks = total, sent, "Reply sent");
        Outcome::Replied { chunks: total, sent }
    }
}
