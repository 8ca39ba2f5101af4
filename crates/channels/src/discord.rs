//! Discord channel adapter.
//!
//! Inbound messages arrive over the Discord Gateway WebSocket; replies and
//! typing indicators go out over the REST API. The gateway task reconnects
//! on its own until the channel is stopped.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use parley_config::DiscordConfig;
use parley_core::channel::{Attachment, Channel, ChannelId, ChannelMessage};
use parley_core::error::ChannelError;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// GUILDS (1) | GUILD_MESSAGES (512) | DIRECT_MESSAGES (4096) | MESSAGE_CONTENT (32768)
pub const GATEWAY_INTENTS: u64 = 1 | 512 | 4096 | 32768;

const DEFAULT_HEARTBEAT_MS: u64 = 41_250;
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

// Gateway opcodes
const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;
const OP_HEARTBEAT_ACK: u64 = 11;

type Inbound = mpsc::Sender<Result<ChannelMessage, ChannelError>>;
type WsWriter = Arc<Mutex<SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>>>;

/// Discord channel adapter.
pub struct DiscordChannel {
    token: String,
    api_base: String,
    require_mention: bool,
    max_message_len: usize,
    connect_gateway: bool,
    client: reqwest::Client,
    bot_user_id: Arc<RwLock<Option<String>>>,
    shutdown: CancellationToken,
    inject_tx: Mutex<Option<Inbound>>,
}

impl std::fmt::Debug for DiscordChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordChannel")
            .field("token", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("require_mention", &self.require_mention)
            .field("max_message_len", &self.max_message_len)
            .finish()
    }
}

impl DiscordChannel {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: DISCORD_API_BASE.into(),
            require_mention: true,
            max_message_len: 2000,
            connect_gateway: true,
            client: reqwest::Client::new(),
            bot_user_id: Arc::new(RwLock::new(None)),
            shutdown: CancellationToken::new(),
            inject_tx: Mutex::new(None),
        }
    }

    /// Build from `[discord]` settings. The bot token is required.
    pub fn from_config(config: &DiscordConfig) -> Result<Self, ChannelError> {
        let token = config
            .bot_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ChannelError::NotConfigured("discord bot token (DISCORD_BOT_TOKEN)".into()))?;

        Ok(Self::new(token)
            .with_require_mention(config.require_mention)
            .with_max_message_len(config.max_message_len))
    }

    /// Point REST and gateway discovery at another base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_require_mention(mut self, require_mention: bool) -> Self {
        self.require_mention = require_mention;
        self
    }

    pub fn with_max_message_len(mut self, max_message_len: usize) -> Self {
        self.max_message_len = max_message_len;
        self
    }

    /// Only accept injected messages; never open the gateway.
    pub fn without_gateway(mut self) -> Self {
        self.connect_gateway = false;
        self
    }

    /// The bot's own user id, known once the gateway sent READY.
    pub fn bot_user_id(&self) -> Option<String> {
        self.bot_user_id.read().ok().and_then(|id| id.clone())
    }

    /// Inject a message as if it came from Discord (for testing).
    pub async fn inject_message(&self, msg: ChannelMessage) -> Result<(), ChannelError> {
        let guard = self.inject_tx.lock().await;
        if let Some(tx) = guard.as_ref() {
            tx.send(Ok(msg))
                .await
                .map_err(|_| ChannelError::ConnectionLost("Message channel closed".into()))
        } else {
            Err(ChannelError::ConnectionLost("Channel not started".into()))
        }
    }

    async fn post(&self, path: &str, body: Option<Value>) -> Result<(), ChannelError> {
        let url = format!("{}{}", self.api_base, path);
        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.token));
        request = match body {
            Some(body) => request.json(&body),
            None => request.header("Content-Length", "0"),
        };

        let response = request.send().await.map_err(|e| ChannelError::DeliveryFailed {
            channel: "discord".into(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChannelError::DeliveryFailed {
                channel: "discord".into(),
                reason: format!("HTTP {}: {}", status.as_u16(), body),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(
        &self,
    ) -> Result<mpsc::Receiver<Result<ChannelMessage, ChannelError>>, ChannelError> {
        if self.connect_gateway && self.token.trim().is_empty() {
            return Err(ChannelError::NotConfigured("discord bot token".into()));
        }

        let (tx, rx) = mpsc::channel(64);
        *self.inject_tx.lock().await = Some(tx.clone());

        if self.connect_gateway {
            info!("Discord channel starting");
            let connection = GatewayConnection {
                token: self.token.clone(),
                api_base: self.api_base.clone(),
                client: self.client.clone(),
                require_mention: self.require_mention,
                bot_user_id: self.bot_user_id.clone(),
                tx,
                shutdown: self.shutdown.clone(),
            };
            tokio::spawn(connection.run());
        } else {
            info!("Discord channel starting (injection only)");
        }

        Ok(rx)
    }

    async fn send(&self, channel_id: &ChannelId, content: &str) -> Result<(), ChannelError> {
        debug!(channel_id = %channel_id, len = content.len(), "Sending Discord message");
        self.post(
            &format!("/channels/{}/messages", channel_id),
            Some(json!({ "content": content })),
        )
        .await
    }

    async fn send_typing(&self, channel_id: &ChannelId) -> Result<(), ChannelError> {
        self.post(&format!("/channels/{}/typing", channel_id), None).await
    }

    fn max_message_len(&self) -> usize {
        self.max_message_len
    }

    async fn stop(&self) -> Result<(), ChannelError> {
        info!("Discord channel stopping");
        self.shutdown.cancel();
        self.inject_tx.lock().await.take();
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, ChannelError> {
        let response = self
            .client
            .get(format!("{}/users/@me", self.api_base))
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await
            .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

// ── Gateway session ──

/// Why a gateway session ended without an error.
enum SessionEnd {
    Shutdown,
    Reconnect,
}

struct GatewayConnection {
    token: String,
    api_base: String,
    client: reqwest::Client,
    require_mention: bool,
    bot_user_id: Arc<RwLock<Option<String>>>,
    tx: Inbound,
    shutdown: CancellationToken,
}

impl GatewayConnection {
    async fn run(self) {
        loop {
            match self.session().await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Reconnect) => info!("Discord gateway asked us to reconnect"),
                Err(e) => warn!(error = %e, "Discord gateway session ended"),
            }

            if self.tx.is_closed() {
                break;
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
        info!("Discord gateway stopped");
    }

    async fn session(&self) -> Result<SessionEnd, ChannelError> {
        let gateway_url = fetch_gateway_url(&self.client, &self.api_base, &self.token).await?;
        info!(url = %gateway_url, "Connecting to Discord gateway");

        let (ws_stream, _) = tokio_tungstenite::connect_async(&gateway_url)
            .await
            .map_err(|e| ChannelError::ConnectionLost(format!("gateway connect: {e}")))?;
        let (write, mut read) = ws_stream.split();
        let write: WsWriter = Arc::new(Mutex::new(write));

        let heartbeat_ms = match read.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                let payload: Value = serde_json::from_str(text.as_str())
                    .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;
                if payload["op"].as_u64() != Some(OP_HELLO) {
                    return Err(ChannelError::InvalidPayload(format!(
                        "expected Hello, got op {}",
                        payload["op"]
                    )));
                }
                payload["d"]["heartbeat_interval"]
                    .as_u64()
                    .unwrap_or(DEFAULT_HEARTBEAT_MS)
            }
            Some(Ok(other)) => {
                return Err(ChannelError::InvalidPayload(format!("expected Hello, got {other:?}")));
            }
            Some(Err(e)) => return Err(ChannelError::ConnectionLost(e.to_string())),
            None => return Err(ChannelError::ConnectionLost("gateway closed before Hello".into())),
        };

        send_json(&write, &identify_payload(&self.token)).await?;
        debug!(heartbeat_ms, "Identified with Discord gateway");

        // Last dispatch sequence number; -1 until the first one arrives.
        let sequence = Arc::new(AtomicI64::new(-1));
        let heartbeat = self.shutdown.child_token();
        let _stop_heartbeat = heartbeat.clone().drop_guard();
        tokio::spawn(heartbeat_loop(
            write.clone(),
            sequence.clone(),
            Duration::from_millis(heartbeat_ms),
            heartbeat,
        ));

        loop {
            let frame = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = write.lock().await.close().await;
                    return Ok(SessionEnd::Shutdown);
                }
                frame = read.next() => frame,
            };

            let text = match frame {
                Some(Ok(WsMessage::Text(text))) => text,
                Some(Ok(WsMessage::Close(frame))) => {
                    return Err(ChannelError::ConnectionLost(format!("gateway closed: {frame:?}")));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ChannelError::ConnectionLost(e.to_string())),
                None => return Err(ChannelError::ConnectionLost("gateway stream ended".into())),
            };

            let payload: Value = match serde_json::from_str(text.as_str()) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, "Ignoring unparsable gateway payload");
                    continue;
                }
            };

            if let Some(seq) = payload["s"].as_i64() {
                sequence.store(seq, Ordering::SeqCst);
            }

            match payload["op"].as_u64() {
                Some(OP_DISPATCH) => {
                    if !self.dispatch(&payload).await {
                        return Ok(SessionEnd::Shutdown);
                    }
                }
                Some(OP_HEARTBEAT) => {
                    send_json(&write, &heartbeat_payload(sequence.load(Ordering::SeqCst))).await?;
                }
                Some(OP_RECONNECT) | Some(OP_INVALID_SESSION) => return Ok(SessionEnd::Reconnect),
                Some(OP_HEARTBEAT_ACK) => trace!("Heartbeat acknowledged"),
                other => trace!(op = ?other, "Ignoring gateway opcode"),
            }
        }
    }

    /// Handle one dispatch event. Returns false once nobody is listening.
    async fn dispatch(&self, payload: &Value) -> bool {
        let data = &payload["d"];
        match payload["t"].as_str() {
            Some("READY") => {
                let id = data["user"]["id"].as_str().map(String::from);
                info!(bot_user_id = ?id, "Discord gateway ready");
                if let Ok(mut slot) = self.bot_user_id.write() {
                    *slot = id;
                }
                true
            }
            Some("MESSAGE_CREATE") => {
                let bot_id = self.bot_user_id.read().ok().and_then(|id| id.clone());
                let Some(msg) = parse_message_create(data, bot_id.as_deref(), self.require_mention)
                else {
                    return true;
                };
                info!(
                    channel_id = %msg.channel_id,
                    author = %msg.author_name,
                    attachments = msg.attachments.len(),
                    "Received Discord message"
                );
                self.tx.send(Ok(msg)).await.is_ok()
            }
            _ => true,
        }
    }
}

async fn heartbeat_loop(
    write: WsWriter,
    sequence: Arc<AtomicI64>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    // The first tick completes immediately; Discord expects the first beat after one period.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let beat = heartbeat_payload(sequence.load(Ordering::SeqCst));
                if let Err(e) = send_json(&write, &beat).await {
                    error!(error = %e, "Discord heartbeat failed");
                    break;
                }
            }
        }
    }
}

async fn send_json(write: &WsWriter, payload: &Value) -> Result<(), ChannelError> {
    write
        .lock()
        .await
        .send(WsMessage::Text(payload.to_string().into()))
        .await
        .map_err(|e| ChannelError::ConnectionLost(e.to_string()))
}

async fn fetch_gateway_url(
    client: &reqwest::Client,
    api_base: &str,
    token: &str,
) -> Result<String, ChannelError> {
    let response = client
        .get(format!("{api_base}/gateway/bot"))
        .header("Authorization", format!("Bot {token}"))
        .send()
        .await
        .map_err(|e| ChannelError::ConnectionLost(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ChannelError::ConnectionLost(format!(
            "gateway discovery failed: HTTP {}",
            status.as_u16()
        )));
    }

    let body: Value = response
        .json()
        .await
        .map_err(|e| ChannelError::InvalidPayload(e.to_string()))?;
    let url = body["url"]
        .as_str()
        .ok_or_else(|| ChannelError::InvalidPayload("gateway response has no url".into()))?;

    Ok(format!("{}/?v=10&encoding=json", url.trim_end_matches('/')))
}

// ── Payloads ──

fn identify_payload(token: &str) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": token,
            "intents": GATEWAY_INTENTS,
            "properties": {
                "os": std::env::consts::OS,
                "browser": "parley",
                "device": "parley"
            }
        }
    })
}

fn heartbeat_payload(sequence: i64) -> Value {
    let d = if sequence < 0 { Value::Null } else { json!(sequence) };
    json!({ "op": OP_HEARTBEAT, "d": d })
}

/// Turn a MESSAGE_CREATE event into a [`ChannelMessage`].
///
/// Returns `None` for the bot's own messages and, when `require_mention`
/// is set, for messages that do not mention the bot. Until READY has told
/// us who we are, nothing counts as a mention.
pub fn parse_message_create(
    data: &Value,
    bot_user_id: Option<&str>,
    require_mention: bool,
) -> Option<ChannelMessage> {
    let channel_id = data["channel_id"].as_str()?;
    let author_id = data["author"]["id"].as_str().unwrap_or_default();
    if bot_user_id.is_some_and(|bot| bot == author_id) {
        return None;
    }

    let raw = data["content"].as_str().unwrap_or_default();
    let mentions_bot = bot_user_id.is_some_and(|bot| {
        data["mentions"]
            .as_array()
            .is_some_and(|mentions| mentions.iter().any(|m| m["id"].as_str() == Some(bot)))
            || raw.contains(&format!("<@{bot}>"))
            || raw.contains(&format!("<@!{bot}>"))
    });
    if require_mention && !mentions_bot {
        trace!(channel_id, "Ignoring message that does not mention the bot");
        return None;
    }

    let content = match bot_user_id {
        Some(bot) => strip_mention(raw, bot),
        None => raw.trim().to_string(),
    };

    let attachments = data["attachments"]
        .as_array()
        .map(|items| items.iter().filter_map(parse_attachment).collect())
        .unwrap_or_default();

    Some(ChannelMessage {
        source: "discord".into(),
        channel_id: ChannelId::from(channel_id),
        sender_id: author_id.to_string(),
        author_name: data["author"]["username"]
            .as_str()
            .unwrap_or("unknown")
            .to_string(),
        content,
        attachments,
        mentions_bot,
        message_id: data["id"].as_str().map(String::from),
    })
}

fn parse_attachment(item: &Value) -> Option<Attachment> {
    Some(Attachment {
        url: item["url"].as_str()?.to_string(),
        filename: item["filename"].as_str().map(String::from),
        mime_type: item["content_type"].as_str().map(String::from),
        size_bytes: item["size"].as_u64(),
    })
}

/// Remove `<@id>` and `<@!id>` mentions of the bot and trim the rest.
pub fn strip_mention(content: &str, bot_user_id: &str) -> String {
    content
        .replace(&format!("<@!{bot_user_id}>"), "")
        .replace(&format!("<@{bot_user_id}>"), "")
        .trim()
        .to_string()
}
