//! Dispatcher: consumes inbound messages, runs commands, publishes replies.
//!
//! Each recognised message gets its own task. The conversation state a message
//! touches (its `!gpt` turn, or a `!clear`) is claimed before the task is
//! spawned, so replies in one channel are built in the order the messages
//! arrived even though they complete concurrently.
//!
//! A semaphore bounds the completion calls in flight. A turn takes its permit
//! only once it is at the head of its channel's queue, so a backlog in one
//! channel never holds up another.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use gptrelay_core::bus::{InboundMessage, MessageBus, OutboundMessage};

use crate::command::{help_text, Command, CLEARED_REPLY, INVALID_PROMPT_REPLY, PONG_REPLY};
use crate::manager::{GptTurn, SessionManager};

pub struct Dispatcher {
    bus: Arc<MessageBus>,
    sessions: Arc<SessionManager>,
    prefix: String,
    permits: Arc<Semaphore>,
}

impl Dispatcher {
    pub fn new(
        bus: Arc<MessageBus>,
        sessions: Arc<SessionManager>,
        prefix: impl Into<String>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            bus,
            sessions,
            prefix: prefix.into(),
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Consume inbound messages until the bus closes.
    pub async fn run(&self) {
        info!("dispatcher started, waiting for messages");
        loop {
            let Some(msg) = self.bus.consume_inbound().await else {
                info!("inbound channel closed, dispatcher exiting");
                break;
            };

            let Some(command) = Command::parse(&msg.content, &self.prefix) else {
                continue;
            };
            debug!(
                channel = %msg.channel,
                server_id = %msg.server_id,
                chat_id = %msg.chat_id,
                command = ?command,
                "received command"
            );

            let reply = PreparedReply::prepare(
                &self.sessions,
                command,
                &msg.server_id,
                &msg.chat_id,
                &self.prefix,
            );
            let bus = Arc::clone(&self.bus);
            let permits = Arc::clone(&self.permits);
            tokio::spawn(async move {
                let text = reply.resolve(Some(&*permits)).await;
                publish_reply(&bus, &msg, text).await;
            });
        }
    }
}

async fn publish_reply(bus: &MessageBus, msg: &InboundMessage, text: String) {
    if let Err(e) = bus.publish_outbound(OutboundMessage::reply(msg, text)).await {
        error!(error = %e, chat_id = %msg.chat_id, "failed to publish reply");
    }
}

/// Answer one command in the given conversation.
///
/// Used by every front end that does not go through the bus.
pub async fn respond(
    sessions: &SessionManager,
    command: Command,
    server_id: &str,
    channel_id: &str,
    prefix: &str,
) -> String {
    PreparedReply::prepare(sessions, command, server_id, channel_id, prefix)
        .resolve(None)
        .await
}

/// A reply whose conversation effects are already ordered.
enum PreparedReply {
    Ready(String),
    Gpt { turn: GptTurn, prompt: String },
}

impl PreparedReply {
    /// Apply the ordering-sensitive part of `command` now.
    fn prepare(
        sessions: &SessionManager,
        command: Command,
        server_id: &str,
        channel_id: &str,
        prefix: &str,
    ) -> Self {
        match command {
            Command::Ping => PreparedReply::Ready(PONG_REPLY.to_string()),
            Command::Help => PreparedReply::Ready(help_text(prefix)),
            Command::EmptyPrompt => PreparedReply::Ready(INVALID_PROMPT_REPLY.to_string()),
            Command::Clear => {
                sessions.clear(server_id, channel_id);
                PreparedReply::Ready(CLEARED_REPLY.to_string())
            }
            Command::GptPrompt(prompt) => PreparedReply::Gpt {
                turn: sessions.reserve(server_id, channel_id),
                prompt,
            },
        }
    }

    async fn resolve(self, limit: Option<&Semaphore>) -> String {
        match self {
            PreparedReply::Ready(text) => text,
            PreparedReply::Gpt { turn, prompt } => match limit {
                Some(limit) => turn.complete_limited(&prompt, limit).await,
                None => turn.complete(&prompt).await,
            },
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SessionStore;
    use crate::testing::ScriptedProvider;
    use gptrelay_core::SessionKey;
    use std::time::Duration;

    struct Harness {
        bus: Arc<MessageBus>,
        provider: Arc<ScriptedProvider>,
        sessions: Arc<SessionManager>,
        handle: tokio::task::JoinHandle<()>,
    }

    impl Harness {
        fn start() -> Self {
            Self::with_limit(8)
        }

        fn with_limit(max_concurrent: usize) -> Self {
            let bus = Arc::new(MessageBus::new(16));
            let provider = Arc::new(ScriptedProvider::new());
            let sessions = Arc::new(SessionManager::new(
                Arc::new(SessionStore::default()),
                provider.clone(),
            ));
            let dispatcher = Dispatcher::new(bus.clone(), sessions.clone(), "!", max_concurrent);
            let handle = tokio::spawn(async move { dispatcher.run().await });
            Harness {
                bus,
                provider,
                sessions,
                handle,
            }
        }

        async fn send(&self, chat: &str, text: &str) {
            let mut msg = InboundMessage::new("discord", "user", "guild", chat, text);
            msg.metadata
                .insert("message_id".to_string(), format!("m-{text}"));
            self.bus.publish_inbound(msg).await.unwrap();
        }

        async fn next_reply(&self) -> OutboundMessage {
            tokio::time::timeout(Duration::from_secs(5), self.bus.consume_outbound())
                .await
                .expect("timed out waiting for reply")
                .expect("outbound closed")
        }
    }

    impl Drop for Harness {
        fn drop(&mut self) {
            self.handle.abort();
        }
    }

    #[tokio::test]
    async fn test_ping_reply() {
        let h = Harness::start();
        h.send("c1", "!ping").await;

        let reply = h.next_reply().await;
        assert_eq!(reply.content, "pong");
        assert_eq!(reply.channel, "discord");
        assert_eq!(reply.chat_id, "c1");
        assert_eq!(reply.reply_to.as_deref(), Some("m-!ping"));
    }

    #[tokio::test]
    async fn test_non_commands_get_no_reply() {
        let h = Harness::start();
        h.send("c1", "just chatting").await;
        h.send("c1", "!unknown").await;
        h.send("c1", "!help").await;

        let reply = h.next_reply().await;
        assert!(reply.content.contains("`!gpt <prompt>`"));
        assert!(h.provider.inputs().is_empty());
    }

    #[tokio::test]
    async fn test_empty_prompt_reply() {
        let h = Harness::start();
        h.send("c1", "!gpt").await;

        let reply = h.next_reply().await;
        assert_eq!(
            reply.content,
            "Invalid prompt: to give a prompt, type `!gpt <prompt>`"
        );
    }

    #[tokio::test]
    async fn test_gpt_reply() {
        let h = Harness::start();
        h.provider.reply_next("Hi! How can I help?");
        h.send("c1", "!gpt Hello").await;

        let reply = h.next_reply().await;
        assert_eq!(reply.content, "Hi! How can I help?");
        assert_eq!(h.provider.inputs(), vec!["Hello"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_channel_prompts_keep_arrival_order() {
        let h = Harness::start();
        // The first call is slow; the second must still see it in its history.
        h.provider
            .delay_calls(&[Duration::from_millis(200), Duration::ZERO]);

        h.send("c1", "!gpt hello").await;
        h.send("c1", "!gpt how are you").await;
        h.next_reply().await;
        h.next_reply().await;

        assert_eq!(h.provider.inputs(), vec!["hello", "hello\nhow are you"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_channel_does_not_delay_other_channels() {
        let h = Harness::with_limit(2);
        h.provider.delay_prompt("slow one", Duration::from_secs(30));
        h.provider.delay_prompt("slow two", Duration::from_secs(30));

        let started = tokio::time::Instant::now();
        h.send("hot", "!gpt slow one").await;
        h.send("hot", "!gpt slow two").await;
        h.send("cold", "!gpt quick").await;

        let first = h.next_reply().await;
        assert_eq!(first.chat_id, "cold");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_prompt_before_clear_never_reaches_new_conversation() {
        let h = Harness::start();
        h.send("c", "!gpt A").await;
        h.send("c", "!clear").await;
        h.send("c", "!gpt D").await;
        for _ in 0..3 {
            h.next_reply().await;
        }

        let mut inputs = h.provider.inputs();
        inputs.sort();
        assert_eq!(inputs, vec!["A", "D"]);
        let session = h.sessions.store().find(&SessionKey::new("guild", "c")).unwrap();
        assert_eq!(session.prompts(), vec!["D"]);
    }

    #[tokio::test]
    async fn test_clear_then_prompt_starts_fresh() {
        let h = Harness::start();

        h.send("c1", "!gpt first").await;
        h.next_reply().await;
        h.send("c1", "!clear").await;
        assert_eq!(h.next_reply().await.content, "Conversation cleared.");
        h.send("c1", "!gpt second").await;
        h.next_reply().await;

        assert_eq!(h.provider.inputs(), vec!["first", "second"]);
        assert_eq!(h.sessions.store().len(), 1);
    }

    #[tokio::test]
    async fn test_clear_without_session_still_replies() {
        let h = Harness::start();
        h.send("c9", "!clear").await;
        assert_eq!(h.next_reply().await.content, "Conversation cleared.");
        assert!(h.sessions.store().is_empty());
    }

    #[tokio::test]
    async fn test_respond_without_bus() {
        let provider = Arc::new(ScriptedProvider::new());
        let sessions = SessionManager::new(Arc::new(SessionStore::default()), provider.clone());

        assert_eq!(respond(&sessions, Command::Ping, "local", "cli", "!").await, "pong");
        respond(&sessions, Command::GptPrompt("hi".into()), "local", "cli", "!").await;
        respond(&sessions, Command::GptPrompt("again".into()), "local", "cli", "!").await;
        assert_eq!(provider.inputs(), vec!["hi", "hi\nagain"]);
    }
}
