//! Conversation session: the prompt history of one (server, channel) pair.
//!
//! A session owns an append-only list of prompts and a fixed deadline. Every
//! `!gpt` turn appends its prompt and sends the whole history, joined by `\n`,
//! to the completion provider.
//!
//! Turns in one session are served strictly in the order they were reserved.
//! The ticket queue below is what makes that hold even though each turn runs
//! in its own task and the completion call is awaited without any lock held.
//! A turn belongs to the session it was reserved on; if the store drops that
//! session in the meantime, the turn still runs against its history.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{debug, error};

use gptrelay_core::SessionKey;
use gptrelay_providers::CompletionProvider;

use crate::clock::Clock;

/// Reply sent in place of a completion when the provider call fails.
pub const COMPLETION_FAILED_REPLY: &str = "Something went wrong. Please try again later.";

// ─────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────

#[derive(Debug)]
pub struct Session {
    key: SessionKey,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    clock: Arc<dyn Clock>,
    state: Mutex<SessionState>,
    /// Ticket currently allowed to run.
    serving: watch::Sender<u64>,
}

#[derive(Debug, Default)]
struct SessionState {
    prompts: Vec<String>,
    next_ticket: u64,
    /// Tickets whose turn was dropped before it was served.
    abandoned: BTreeSet<u64>,
}

impl Session {
    /// Create a session whose deadline is `timeout` after the clock's now.
    pub fn new(key: SessionKey, clock: Arc<dyn Clock>, timeout: Duration) -> Self {
        let created_at = clock.now();
        let expires_at = created_at
            .checked_add_signed(timeout)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let (serving, _) = watch::channel(0);

        Session {
            key,
            created_at,
            expires_at,
            clock,
            state: Mutex::new(SessionState::default()),
            serving,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Snapshot of the prompt history, oldest first.
    pub fn prompts(&self) -> Vec<String> {
        self.lock_state().prompts.clone()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(self.clock.now())
    }

    /// Expired strictly after the deadline; at the deadline itself it is live.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Take the next place in this session's turn queue.
    pub fn reserve_turn(self: &Arc<Self>) -> PendingTurn {
        let ticket = {
            let mut state = self.lock_state();
            let ticket = state.next_ticket;
            state.next_ticket += 1;
            ticket
        };
        PendingTurn {
            session: Arc::clone(self),
            ticket,
        }
    }

    /// Append `prompt` and complete the whole history, queued behind every
    /// turn reserved earlier.
    pub async fn append_and_complete(
        self: &Arc<Self>,
        prompt: &str,
        provider: &dyn CompletionProvider,
    ) -> String {
        self.reserve_turn()
            .append_and_complete(prompt, provider)
            .await
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().expect("session state lock poisoned")
    }

    /// Hand the queue to the next live ticket, or remember `ticket` as
    /// abandoned if it was never served.
    fn release_turn(&self, ticket: u64) {
        let mut state = self.lock_state();
        let current = *self.serving.borrow();
        if ticket != current {
            state.abandoned.insert(ticket);
            return;
        }

        let mut next = ticket + 1;
        while state.abandoned.remove(&next) {
            next += 1;
        }
        self.serving.send_replace(next);
    }
}

// ─────────────────────────────────────────────
// PendingTurn
// ─────────────────────────────────────────────

/// A reserved place in a session's turn queue.
///
/// Dropping it without running releases the place, so later turns never wait
/// on a turn that will not come.
#[derive(Debug)]
pub struct PendingTurn {
    session: Arc<Session>,
    ticket: u64,
}

impl PendingTurn {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Wait until every turn reserved before this one has finished.
    pub async fn served(self) -> ServedTurn {
        let ticket = self.ticket;
        let mut serving = self.session.serving.subscribe();
        // The sender lives inside the session, which this turn keeps alive.
        let _ = serving.wait_for(|now_serving| *now_serving == ticket).await;
        ServedTurn { turn: self }
    }

    /// Wait for this turn, then append `prompt` and complete the history.
    pub async fn append_and_complete(
        self,
        prompt: &str,
        provider: &dyn CompletionProvider,
    ) -> String {
        self.served().await.append_and_complete(prompt, provider).await
    }
}

impl Drop for PendingTurn {
    fn drop(&mut self) {
        self.session.release_turn(self.ticket);
    }
}

/// A turn at the head of its session's queue. Dropping it lets the next turn
/// run.
#[derive(Debug)]
pub struct ServedTurn {
    turn: PendingTurn,
}

impl ServedTurn {
    /// Append `prompt` and ask the provider for a completion of the full
    /// history.
    ///
    /// A provider failure is logged and answered with
    /// [`COMPLETION_FAILED_REPLY`]; the prompt stays in the history.
    pub async fn append_and_complete(
        self,
        prompt: &str,
        provider: &dyn CompletionProvider,
    ) -> String {
        let session = &self.turn.session;
        let history = {
            let mut state = session.lock_state();
            state.prompts.push(prompt.to_string());
            state.prompts.clone()
        };

        let key = &session.key;
        debug!(
            server_id = %key.server_id,
            channel_id = %key.channel_id,
            prompts = history.len(),
            "requesting completion"
        );

        match provider.complete(&history).await {
            Ok(text) => text,
            Err(e) => {
                error!(
                    server_id = %key.server_id,
                    channel_id = %key.channel_id,
                    provider = provider.display_name(),
                    error = %e,
                    "completion failed"
                );
                COMPLETION_FAILED_REPLY.to_string()
            }
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
