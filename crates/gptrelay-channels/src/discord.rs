//! Discord channel: raw Gateway WebSocket + REST API.
//!
//! Receives messages over the Gateway (v10) and sends replies through the
//! REST API. No Discord library required.
//!
//! - Heartbeat with zombie-connection detection, resume, and reconnect
//! - Messages from bots (including this one) are ignored
//! - Guild messages use the guild id as server id; DMs use `@me`
//! - Typing indicator while a command is being answered
//! - Replies over 2000 characters are split; HTTP 429 is retried

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use gptrelay_core::bus::{InboundMessage, MessageBus, OutboundMessage};
use gptrelay_core::types::DIRECT_MESSAGE_SERVER;

use crate::base::Channel;

// ─────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────

/// Discord REST API base URL.
const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Default Gateway WebSocket URL.
const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Discord message length limit, in characters.
const DISCORD_MAX_LEN: usize = 2000;

/// Typing indicator refresh interval (Discord typing lasts ~10s).
const TYPING_INTERVAL_SECS: u64 = 8;

/// Give up showing the typing indicator after this long without a reply.
const TYPING_MAX_SECS: u64 = 120;

/// Total REST attempts per chunk, rate-limited ones included.
const MAX_SEND_ATTEMPTS: u32 = 5;

/// Wait before reconnecting after a gateway error.
const RECONNECT_DELAY_SECS: u64 = 5;

/// GUILDS(1) + GUILD_MESSAGES(512) + DIRECT_MESSAGES(4096) + MESSAGE_CONTENT(32768).
const DEFAULT_INTENTS: u64 = 1 + 512 + 4096 + 32768;

// Gateway opcodes
const OP_DISPATCH: u64 = 0;
const OP_HEARTBEAT: u64 = 1;
const OP_IDENTIFY: u64 = 2;
const OP_PRESENCE_UPDATE: u64 = 3;
const OP_RESUME: u64 = 6;
const OP_RECONNECT: u64 = 7;
const OP_INVALID_SESSION: u64 = 9;
const OP_HELLO: u64 = 10;
const OP_HEARTBEAT_ACK: u64 = 11;

/// Frames the heartbeat task hands to the connection loop.
enum Frame {
    Send(String),
    /// The previous heartbeat was never acknowledged.
    Zombie,
}

/// Resume information from the last READY.
#[derive(Debug, Default)]
struct ResumeState {
    session_id: Option<String>,
    resume_url: Option<String>,
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

// ─────────────────────────────────────────────
// DiscordChannel
// ─────────────────────────────────────────────

pub struct DiscordChannel {
    /// Bot token from the Discord Developer Portal.
    token: String,
    bus: Arc<MessageBus>,
    /// Messages starting with this get a typing indicator.
    command_prefix: String,
    gateway_url: String,
    api_base: String,
    intents: u64,
    /// Flips to `true` once on stop.
    shutdown: watch::Sender<bool>,
    http: reqwest::Client,
    /// Active typing indicator tasks keyed by channel id.
    typing_tasks: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
    /// Last sequence number seen on the gateway.
    seq: Arc<Mutex<Option<u64>>>,
    resume: Mutex<ResumeState>,
}

impl DiscordChannel {
    pub fn new(
        token: impl Into<String>,
        bus: Arc<MessageBus>,
        command_prefix: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("failed to create HTTP client")?;
        let (shutdown, _) = watch::channel(false);

        Ok(Self {
            token: token.into(),
            bus,
            command_prefix: command_prefix.into(),
            gateway_url: DEFAULT_GATEWAY_URL.into(),
            api_base: DISCORD_API_BASE.into(),
            intents: DEFAULT_INTENTS,
            shutdown,
            http,
            typing_tasks: Arc::new(RwLock::new(HashMap::new())),
            seq: Arc::new(Mutex::new(None)),
            resume: Mutex::new(ResumeState::default()),
        })
    }

    /// Point REST calls at another base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run gateway sessions until shutdown, reconnecting after errors.
    async fn run_gateway(&self) -> anyhow::Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        while !self.is_shutting_down() {
            match self.gateway_session().await {
                Ok(()) => {
                    info!("discord gateway session ended");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "discord gateway error, reconnecting in {RECONNECT_DELAY_SECS}s");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)) => {}
                        _ = shutdown.wait_for(|stop| *stop) => {
                            info!("discord shutdown during reconnect wait");
                            break;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// One Gateway connection. `Ok` means shutdown was requested; any `Err`
    /// asks the caller to reconnect.
    async fn gateway_session(&self) -> anyhow::Result<()> {
        let url = self
            .resume
            .lock()
            .await
            .resume_url
            .clone()
            .map(|u| format!("{u}/?v=10&encoding=json"))
            .unwrap_or_else(|| self.gateway_url.clone());

        debug!(url = %url, "connecting to discord gateway");
        let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .context("gateway connect failed")?;
        let (mut write, mut read) = ws_stream.split();

        let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(16);
        let acked = Arc::new(AtomicBool::new(true));
        let mut heartbeat: Option<AbortOnDrop> = None;
        let mut shutdown = self.shutdown.subscribe();

        loop {
            tokio::select! {
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(WsMessage::Text(t))) => t.to_string(),
                        Some(Ok(WsMessage::Close(frame))) => bail!("gateway closed: {frame:?}"),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e).context("gateway read failed"),
                        None => bail!("gateway stream ended"),
                    };

                    let payload: Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(error = %e, "discord gateway sent invalid json");
                            continue;
                        }
                    };

                    if let Some(s) = payload["s"].as_u64() {
                        *self.seq.lock().await = Some(s);
                    }

                    match payload["op"].as_u64().unwrap_or(u64::MAX) {
                        OP_HELLO => {
                            let interval = payload["d"]["heartbeat_interval"].as_u64().unwrap_or(41250);
                            debug!(interval_ms = interval, "discord HELLO received");

                            acked.store(true, Ordering::SeqCst);
                            heartbeat = Some(AbortOnDrop(spawn_heartbeat(
                                interval,
                                Arc::clone(&self.seq),
                                Arc::clone(&acked),
                                frame_tx.clone(),
                            )));

                            let hello_reply = self.identify_or_resume().await;
                            write.send(WsMessage::text(hello_reply.to_string())).await?;
                        }
                        OP_DISPATCH => {
                            self.handle_dispatch(&payload, &mut write).await?;
                        }
                        OP_HEARTBEAT_ACK => {
                            acked.store(true, Ordering::SeqCst);
                        }
                        OP_HEARTBEAT => {
                            let seq = *self.seq.lock().await;
                            write.send(WsMessage::text(heartbeat_payload(seq).to_string())).await?;
                        }
                        OP_RECONNECT => bail!("reconnect requested"),
                        OP_INVALID_SESSION => {
                            let resumable = payload["d"].as_bool().unwrap_or(false);
                            warn!(resumable, "discord invalid session");
                            if !resumable {
                                *self.resume.lock().await = ResumeState::default();
                            }
                            bail!("invalid session");
                        }
                        op => debug!(op, "discord gateway op ignored"),
                    }
                }
                frame = frame_rx.recv() => match frame {
                    Some(Frame::Send(text)) => {
                        write.send(WsMessage::text(text)).await?;
                    }
                    Some(Frame::Zombie) => bail!("heartbeat not acknowledged"),
                    None => {}
                },
                _ = shutdown_requested(&mut shutdown) => {
                    info!("discord shutdown signal received");
                    drop(heartbeat.take());
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }

    async fn handle_dispatch<S>(&self, payload: &Value, write: &mut S) -> anyhow::Result<()>
    where
        S: futures_util::Sink<WsMessage> + Unpin,
        S::Error: std::error::Error + Send + Sync + 'static,
    {
        match payload["t"].as_str().unwrap_or("") {
            "READY" => {
                let data = &payload["d"];
                {
                    let mut resume = self.resume.lock().await;
                    resume.session_id = data["session_id"].as_str().map(String::from);
                    resume.resume_url = data["resume_gateway_url"].as_str().map(String::from);
                }
                let user = data["user"]["username"].as_str().unwrap_or("unknown");
                info!(user, "discord bot READY");
                write
                    .send(WsMessage::text(presence_payload().to_string()))
                    .await?;
            }
            "RESUMED" => info!("discord session resumed"),
            "MESSAGE_CREATE" => self.handle_message_create(&payload["d"]).await,
            event => debug!(event, "discord event (unhandled)"),
        }
        Ok(())
    }

    /// RESUME when a previous session can be picked up, IDENTIFY otherwise.
    async fn identify_or_resume(&self) -> Value {
        let session_id = self.resume.lock().await.session_id.clone();
        match session_id {
            Some(session_id) => {
                let seq = *self.seq.lock().await;
                json!({
                    "op": OP_RESUME,
                    "d": { "token": self.token, "session_id": session_id, "seq": seq }
                })
            }
            None => json!({
                "op": OP_IDENTIFY,
                "d": {
                    "token": self.token,
                    "intents": self.intents,
                    "properties": { "os": "gptrelay", "browser": "gptrelay", "device": "gptrelay" }
                }
            }),
        }
    }

    /// Turn a MESSAGE_CREATE event into an inbound bus message.
    async fn handle_message_create(&self, data: &Value) {
        if data["author"]["bot"].as_bool().unwrap_or(false) {
            return;
        }

        let (Some(sender_id), Some(channel_id)) =
            (data["author"]["id"].as_str(), data["channel_id"].as_str())
        else {
            return;
        };

        let content = data["content"].as_str().unwrap_or("");
        if content.trim().is_empty() {
            debug!(channel_id, "discord message without text, skipping");
            return;
        }

        let server_id = data["guild_id"].as_str().unwrap_or(DIRECT_MESSAGE_SERVER);
        let username = data["author"]["username"].as_str().unwrap_or("");

        debug!(
            sender = %sender_id,
            server_id = %server_id,
            channel_id = %channel_id,
            username = %username,
            content_len = content.len(),
            "discord inbound message"
        );

        if content.trim_start().starts_with(&self.command_prefix) {
            self.start_typing(channel_id).await;
        }

        let mut inbound = InboundMessage::new("discord", sender_id, server_id, channel_id, content);
        inbound
            .metadata
            .insert("username".into(), username.to_string());
        if let Some(msg_id) = data["id"].as_str() {
            inbound
                .metadata
                .insert("message_id".into(), msg_id.to_string());
        }

        if let Err(e) = self.bus.publish_inbound(inbound).await {
            error!(error = %e, "failed to publish discord message to bus");
        }
    }

    /// Show "typing…" in a channel until a reply is sent or the cap passes.
    async fn start_typing(&self, channel_id: &str) {
        self.stop_typing(channel_id).await;

        let url = format!("{}/channels/{channel_id}/typing", self.api_base);
        let auth = format!("Bot {}", self.token);
        let http = self.http.clone();
        let mut shutdown = self.shutdown.subscribe();
        let channel = channel_id.to_string();

        let handle = tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(TYPING_MAX_SECS);
            while tokio::time::Instant::now() < deadline {
                let _ = http.post(&url).header("Authorization", &auth).send().await;

                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(TYPING_INTERVAL_SECS)) => {}
                    _ = shutdown.wait_for(|stop| *stop) => break,
                }
            }
            debug!(channel_id = %channel, "typing indicator stopped");
        });

        self.typing_tasks
            .write()
            .await
            .insert(channel_id.to_string(), handle);
    }

    async fn stop_typing(&self, channel_id: &str) {
        if let Some(handle) = self.typing_tasks.write().await.remove(channel_id) {
            handle.abort();
        }
    }

    async fn stop_all_typing(&self) {
        for (_, handle) in self.typing_tasks.write().await.drain() {
            handle.abort();
        }
    }

    /// Post one message via the REST API, retrying on rate limits and
    /// transient errors.
    async fn send_rest(
        &self,
        channel_id: &str,
        content: &str,
        reply_to: Option<&str>,
    ) -> anyhow::Result<()> {
        let url = format!("{}/channels/{channel_id}/messages", self.api_base);

        let mut body = json!({ "content": content });
        if let Some(ref_id) = reply_to {
            body["message_reference"] = json!({ "message_id": ref_id, "fail_if_not_exists": false });
            body["allowed_mentions"] = json!({ "replied_user": false });
        }

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let resp = self
                .http
                .post(&url)
                .header("Authorization", format!("Bot {}", self.token))
                .json(&body)
                .send()
                .await
                .context("discord send request failed")?;

            let status = resp.status();
            if status.is_success() {
                return Ok(());
            }

            let body_text = resp.text().await.unwrap_or_default();
            if attempt >= MAX_SEND_ATTEMPTS {
                bail!("discord send failed after {attempt} attempts (HTTP {status}): {body_text}");
            }

            if status.as_u16() == 429 {
                let retry_after = serde_json::from_str::<Value>(&body_text)
                    .ok()
                    .and_then(|v| v["retry_after"].as_f64())
                    .unwrap_or(1.0);
                warn!(retry_after_s = retry_after, attempt, "discord rate limited");
                tokio::time::sleep(Duration::from_secs_f64(retry_after.max(0.0))).await;
            } else if status.is_server_error() {
                warn!(status = %status, attempt, "discord send error, retrying in 1s");
                tokio::time::sleep(Duration::from_secs(1)).await;
            } else {
                bail!("discord rejected message (HTTP {status}): {body_text}");
            }
        }
    }
}

/// Heartbeat until the connection loop goes away or an ACK goes missing.
fn spawn_heartbeat(
    interval_ms: u64,
    seq: Arc<Mutex<Option<u64>>>,
    acked: Arc<AtomicBool>,
    frames: mpsc::Sender<Frame>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let jitter = (interval_ms as f64 * rand_jitter()) as u64;
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        loop {
            if !acked.swap(false, Ordering::SeqCst) {
                warn!("discord heartbeat not ACKed, requesting reconnect");
                let _ = frames.send(Frame::Zombie).await;
                break;
            }

            let payload = heartbeat_payload(*seq.lock().await).to_string();
            if frames.send(Frame::Send(payload)).await.is_err() {
                break;
            }

            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }
    })
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

fn heartbeat_payload(seq: Option<u64>) -> Value {
    json!({ "op": OP_HEARTBEAT, "d": seq })
}

fn presence_payload() -> Value {
    json!({
        "op": OP_PRESENCE_UPDATE,
        "d": {
            "since": null,
            "activities": [{ "name": "Answering queries...", "type": 0 }],
            "status": "online",
            "afk": false
        }
    })
}

/// Split a message into chunks of at most `max_len` characters.
///
/// Prefers to break after a newline; never splits inside a character.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > max_len {
        let hard_end = remaining
            .char_indices()
            .nth(max_len)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());

        let split_at = remaining[..hard_end]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(hard_end);

        chunks.push(remaining[..split_at].to_string());
        remaining = &remaining[split_at..];
    }

    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}

/// A fraction in [0, 1) for heartbeat jitter.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos as f64) / 1_000_000_000.0
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self) -> anyhow::Result<()> {
        if self.token.is_empty() {
            bail!("discord token is empty");
        }

        info!("starting discord channel (gateway v10)");
        self.run_gateway().await
    }

    async fn stop(&self) -> anyhow::Result<()> {
        info!("stopping discord channel");
        self.shutdown.send_replace(true);
        self.stop_all_typing().await;
        Ok(())
    }

    async fn send(&self, msg: &OutboundMessage) -> anyhow::Result<()> {
        let chunks = split_message(&msg.content, DISCORD_MAX_LEN);

        let result = async {
            for (i, chunk) in chunks.iter().enumerate() {
                // Only the first chunk replies to the triggering message
                let reply_to = if i == 0 { msg.reply_to.as_deref() } else { None };
                self.send_rest(&msg.chat_id, chunk, reply_to).await?;
            }
            anyhow::Ok(())
        }
        .await;

        self.stop_typing(&msg.chat_id).await;
        result?;

        debug!(chat_id = %msg.chat_id, chunks = chunks.len(), "discord message sent");
        Ok(())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// REST calls go to a closed local port unless a test says otherwise.
    fn create_channel(bus: Arc<MessageBus>) -> DiscordChannel {
        DiscordChannel::new("test_token", bus, "!")
            .unwrap()
            .with_api_base("http://127.0.0.1:1")
    }

    async fn try_consume(bus: &MessageBus) -> Option<InboundMessage> {
        tokio::time::timeout(Duration::from_millis(50), bus.consume_inbound())
            .await
            .ok()
            .flatten()
    }

    #[test]
    fn test_channel_name() {
        let ch = create_channel(Arc::new(MessageBus::new(8)));
        assert_eq!(ch.name(), "discord");
    }

    #[test]
    fn test_constants() {
        assert_eq!(DISCORD_MAX_LEN, 2000);
        assert_eq!(DEFAULT_INTENTS, 37377);
    }

    // ── split_message ──

    #[test]
    fn test_split_message_short() {
        assert_eq!(split_message("hello", 2000), vec!["hello"]);
    }

    #[test]
    fn test_split_message_empty() {
        assert_eq!(split_message("", 2000), vec![""]);
    }

    #[test]
    fn test_split_message_exact() {
        let msg = "a".repeat(2000);
        assert_eq!(split_message(&msg, 2000).len(), 1);
    }

    #[test]
    fn test_split_message_no_newline() {
        let msg = "x".repeat(2500);
        let chunks = split_message(&msg, 2000);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 2000);
        assert_eq!(chunks[1].len(), 500);
    }

    #[test]
    fn test_split_message_at_newline() {
        let mut msg = "x".repeat(1990);
        msg.push('\n');
        msg.push_str(&"y".repeat(500));
        let chunks = split_message(&msg, 2000);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with('\n'));
        assert_eq!(chunks[1], "y".repeat(500));
    }

    #[test]
    fn test_split_message_multibyte() {
        let msg = "é".repeat(2500);
        let chunks = split_message(&msg, 2000);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 2000);
        assert_eq!(chunks[1].chars().count(), 500);
        assert_eq!(chunks.concat(), msg);
    }

    // ── gateway payloads ──

    #[tokio::test]
    async fn test_identify_without_session() {
        let ch = create_channel(Arc::new(MessageBus::new(8)));
        let payload = ch.identify_or_resume().await;
        assert_eq!(payload["op"], OP_IDENTIFY);
        assert_eq!(payload["d"]["token"], "test_token");
        assert_eq!(payload["d"]["intents"], DEFAULT_INTENTS);
    }

    #[tokio::test]
    async fn test_resume_with_session() {
        let ch = create_channel(Arc::new(MessageBus::new(8)));
        ch.resume.lock().await.session_id = Some("sess-1".into());
        *ch.seq.lock().await = Some(42);

        let payload = ch.identify_or_resume().await;
        assert_eq!(payload["op"], OP_RESUME);
        assert_eq!(payload["d"]["session_id"], "sess-1");
        assert_eq!(payload["d"]["seq"], 42);
    }

    #[test]
    fn test_heartbeat_payload() {
        assert_eq!(heartbeat_payload(None), json!({"op": 1, "d": null}));
        assert_eq!(heartbeat_payload(Some(7)), json!({"op": 1, "d": 7}));
    }

    #[test]
    fn test_rand_jitter_range() {
        assert!((0.0..1.0).contains(&rand_jitter()));
    }

    // ── MESSAGE_CREATE ──

    #[tokio::test]
    async fn test_message_create_publishes() {
        let bus = Arc::new(MessageBus::new(8));
        let ch = create_channel(bus.clone());

        ch.handle_message_create(&json!({
            "id": "msg1",
            "author": { "id": "user1", "username": "testuser" },
            "channel_id": "ch1",
            "guild_id": "guild1",
            "content": "!gpt Hello There"
        }))
        .await;

        let msg = try_consume(&bus).await.expect("message published");
        assert_eq!(msg.channel, "discord");
        assert_eq!(msg.sender_id, "user1");
        assert_eq!(msg.server_id, "guild1");
        assert_eq!(msg.chat_id, "ch1");
        assert_eq!(msg.content, "!gpt Hello There");
        assert_eq!(msg.message_id(), Some("msg1"));
        assert_eq!(msg.metadata.get("username").unwrap(), "testuser");

        // Prefixed messages get a typing indicator
        assert!(ch.typing_tasks.read().await.contains_key("ch1"));
        ch.stop_all_typing().await;
    }

    #[tokio::test]
    async fn test_message_create_dm_uses_me_server() {
        let bus = Arc::new(MessageBus::new(8));
        let ch = create_channel(bus.clone());

        ch.handle_message_create(&json!({
            "author": { "id": "user1", "username": "testuser" },
            "channel_id": "dm1",
            "content": "hello"
        }))
        .await;

        let msg = try_consume(&bus).await.expect("message published");
        assert_eq!(msg.server_id, "@me");
        // Not a command, no typing indicator
        assert!(ch.typing_tasks.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_message_create_ignores_bots() {
        let bus = Arc::new(MessageBus::new(8));
        let ch = create_channel(bus.clone());

        ch.handle_message_create(&json!({
            "author": { "id": "123", "username": "gptrelay", "bot": true },
            "channel_id": "456",
            "content": "!ping"
        }))
        .await;

        assert!(try_consume(&bus).await.is_none());
    }

    #[tokio::test]
    async fn test_message_create_skips_empty_content() {
        let bus = Arc::new(MessageBus::new(8));
        let ch = create_channel(bus.clone());

        ch.handle_message_create(&json!({
            "author": { "id": "user1" },
            "channel_id": "ch1",
            "content": "   "
        }))
        .await;

        assert!(try_consume(&bus).await.is_none());
    }

    // ── REST send ──

    #[tokio::test]
    async fn test_send_posts_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/ch1/messages"))
            .and(header("Authorization", "Bot test_token"))
            .and(body_partial_json(json!({
                "content": "pong",
                "message_reference": { "message_id": "m1" }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let ch = create_channel(Arc::new(MessageBus::new(8))).with_api_base(server.uri());
        let mut reply = OutboundMessage::new("discord", "ch1", "pong");
        reply.reply_to = Some("m1".into());

        ch.send(&reply).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_splits_long_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/ch1/messages"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let ch = create_channel(Arc::new(MessageBus::new(8))).with_api_base(server.uri());
        ch.send(&OutboundMessage::new("discord", "ch1", "z".repeat(2500)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_retries_after_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/ch1/messages"))
            .respond_with(
                ResponseTemplate::new(429).set_body_json(json!({ "retry_after": 0.01 })),
            )
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/channels/ch1/messages"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let ch = create_channel(Arc::new(MessageBus::new(8))).with_api_base(server.uri());
        ch.send(&OutboundMessage::new("discord", "ch1", "hi"))
            .await
            .unwrap();

        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_send_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/channels/ch1/messages"))
            .respond_with(ResponseTemplate::new(403).set_body_string("Missing Access"))
            .expect(1)
            .mount(&server)
            .await;

        let ch = create_channel(Arc::new(MessageBus::new(8))).with_api_base(server.uri());
        let err = ch
            .send(&OutboundMessage::new("discord", "ch1", "hi"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("403"));
    }

    #[tokio::test]
    async fn test_send_stops_typing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let ch = create_channel(Arc::new(MessageBus::new(8))).with_api_base(server.uri());
        ch.start_typing("ch1").await;
        assert!(ch.typing_tasks.read().await.contains_key("ch1"));

        ch.send(&OutboundMessage::new("discord", "ch1", "done"))
            .await
            .unwrap();
        assert!(ch.typing_tasks.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_start_without_token_fails() {
        let ch = DiscordChannel::new("", Arc::new(MessageBus::new(8)), "!").unwrap();
        assert!(ch.start().await.is_err());
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let ch = create_channel(Arc::new(MessageBus::new(8)));
        ch.stop().await.unwrap();
        ch.stop().await.unwrap();
        assert!(ch.is_shutting_down());
    }
}
