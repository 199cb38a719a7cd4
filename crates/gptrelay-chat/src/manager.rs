//! Session manager: the two operations the command layer needs:
//! answer a `!gpt` prompt and clear a conversation.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::debug;

use gptrelay_core::SessionKey;
use gptrelay_providers::CompletionProvider;

use crate::session::PendingTurn;
use crate::store::SessionStore;

pub struct SessionManager {
    store: Arc<SessionStore>,
    provider: Arc<dyn CompletionProvider>,
}

impl SessionManager {
    pub fn new(store: Arc<SessionStore>, provider: Arc<dyn CompletionProvider>) -> Self {
        Self { store, provider }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Take a place in the conversation's turn queue without waiting.
    ///
    /// Turns complete in the order they were reserved, so callers that reserve
    /// in message arrival order get replies built in that order.
    pub fn reserve(&self, server_id: &str, channel_id: &str) -> GptTurn {
        let key = SessionKey::new(server_id, channel_id);
        GptTurn {
            provider: Arc::clone(&self.provider),
            pending: self.store.get_or_create(&key).reserve_turn(),
        }
    }

    /// Append `prompt` to the conversation and return the completion.
    pub async fn handle_gpt(&self, server_id: &str, channel_id: &str, prompt: &str) -> String {
        self.reserve(server_id, channel_id).complete(prompt).await
    }

    /// Forget the conversation. A no-op when there is none.
    ///
    /// Turns reserved before the clear still finish in the old conversation;
    /// the next prompt starts a fresh one.
    pub fn clear(&self, server_id: &str, channel_id: &str) {
        let key = SessionKey::new(server_id, channel_id);
        if self.store.remove(&key) {
            debug!(server_id, channel_id, "conversation cleared");
        } else {
            debug!(server_id, channel_id, "clear: no conversation");
        }
    }
}

/// A reserved `!gpt` turn in one conversation.
pub struct GptTurn {
    provider: Arc<dyn CompletionProvider>,
    pending: PendingTurn,
}

impl GptTurn {
    /// Wait for this turn and complete `prompt` against the session history.
    pub async fn complete(self, prompt: &str) -> String {
        self.pending
            .append_and_complete(prompt, self.provider.as_ref())
            .await
    }

    /// Like [`GptTurn::complete`], but the provider call also holds a permit
    /// from `limit`.
    ///
    /// The permit is taken only once the turn reaches the head of its queue,
    /// so turns waiting behind a slow one in the same channel hold nothing.
    pub async fn complete_limited(self, prompt: &str, limit: &Semaphore) -> String {
        let served = self.pending.served().await;
        // Never closed; a closed semaphore would just lift the bound.
        let _permit = limit.acquire().await.ok();
        served.append_and_complete(prompt, self.provider.as_ref()).await
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
