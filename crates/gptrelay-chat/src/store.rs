//! Session store: every live conversation, keyed by (server, channel).
//!
//! The map is guarded by a single `std::sync::Mutex`. Every operation holds it
//! only for map bookkeeping and never across an await, so completions in
//! different channels never wait on each other here.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Duration;
use tracing::debug;

use gptrelay_core::config::schema::DEFAULT_SESSION_TIMEOUT_SECS;
use gptrelay_core::SessionKey;

use crate::clock::{Clock, SystemClock};
use crate::session::Session;

#[derive(Debug)]
pub struct SessionStore {
    sessions: Mutex<HashMap<SessionKey, Arc<Session>>>,
    timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS))
    }
}

impl SessionStore {
    /// Store whose sessions live `timeout` from creation, on the system clock.
    pub fn new(timeout: std::time::Duration) -> Self {
        Self::with_clock(timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(timeout: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        SessionStore {
            sessions: Mutex::new(HashMap::new()),
            timeout: Duration::from_std(timeout).unwrap_or(Duration::MAX),
            clock,
        }
    }

    /// Look up a session. Absence is not an error.
    ///
    /// An expired session the sweeper has not reached yet is still returned.
    pub fn find(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.lock().get(key).cloned()
    }

    /// Return the live session for `key`, creating it if there is none.
    ///
    /// Check and insert happen under one lock, so concurrent callers for the
    /// same key all get the same session. An expired entry that is still in
    /// the map is replaced as if it had already been swept.
    pub fn get_or_create(&self, key: &SessionKey) -> Arc<Session> {
        let now = self.clock.now();
        let mut sessions = self.lock();

        if let Some(existing) = sessions.get(key) {
            if !existing.is_expired_at(now) {
                return Arc::clone(existing);
            }
            debug!(
                server_id = %key.server_id,
                channel_id = %key.channel_id,
                "replacing expired session"
            );
        }

        let session = Arc::new(Session::new(
            key.clone(),
            Arc::clone(&self.clock),
            self.timeout,
        ));
        sessions.insert(key.clone(), Arc::clone(&session));
        debug!(
            server_id = %key.server_id,
            channel_id = %key.channel_id,
            expires_at = %session.expires_at(),
            "session created"
        );
        session
    }

    /// Drop the session for `key`. Returns whether one was present.
    ///
    /// Turns already queued on the dropped session still run against its
    /// history; later turns land in a fresh session.
    pub fn remove(&self, key: &SessionKey) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drop every expired session in one pass. Returns how many were removed.
    pub fn remove_expired(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.lock();
        let before = sessions.len();

        sessions.retain(|key, session| {
            if !session.is_expired_at(now) {
                return true;
            }
            debug!(
                server_id = %key.server_id,
                channel_id = %key.channel_id,
                "session expired"
            );
            false
        });

        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Configured session lifetime.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionKey, Arc<Session>>> {
        self.sessions.lock().expect("session store lock poisoned")
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{DateTime, Utc};

    fn key(server: &str, channel: &str) -> SessionKey {
        SessionKey::new(server, channel)
    }

    fn store_with_clock(timeout_secs: u64) -> (SessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(DateTime::<Utc>::UNIX_EPOCH));
        let store =
            SessionStore::with_clock(std::time::Duration::from_secs(timeout_secs), clock.clone());
        (store, clock)
    }

    #[test]
    fn test_find_on_empty_store() {
        let store = SessionStore::default();
        assert!(store.find(&key("g", "c")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_find_unknown_key() {
        let store = SessionStore::default();
        store.get_or_create(&key("g", "c1"));
        assert!(store.find(&key("g", "c2")).is_none());
        assert!(store.find(&key("g2", "c1")).is_none());
    }

    #[test]
    fn test_get_or_create_returns_existing() {
        let store = SessionStore::default();
        let a = store.get_or_create(&key("g", "c"));
        let b = store.get_or_create(&key("g", "c"));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a, &store.find(&key("g", "c")).unwrap()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_get_or_create_single_session() {
        let store = SessionStore::default();
        let k = key("guild", "chan");

        let sessions: Vec<Arc<Session>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| store.get_or_create(&k)))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(store.len(), 1);
        for session in &sessions[1..] {
            assert!(Arc::ptr_eq(&sessions[0], session));
        }
    }

    #[test]
    fn test_default_timeout_is_one_day() {
        let (store, _) = store_with_clock(DEFAULT_SESSION_TIMEOUT_SECS);
        let session = store.get_or_create(&key("g", "c"));
        assert_eq!(
            session.expires_at() - session.created_at(),
            Duration::seconds(86400)
        );
    }

    #[test]
    fn test_remove_present_and_missing() {
        let store = SessionStore::default();
        let session = store.get_or_create(&key("g", "c"));

        assert!(store.remove(&key("g", "c")));
        assert!(store.find(&key("g", "c")).is_none());
        assert!(!Arc::ptr_eq(&session, &store.get_or_create(&key("g", "c"))));
        assert!(store.remove(&key("g", "c")));

        // Second removal is a no-op
        assert!(!store.remove(&key("g", "c")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_expired_removes_all_expired() {
        let (store, clock) = store_with_clock(100);

        let past_a = store.get_or_create(&key("g", "past-a"));
        let past_b = store.get_or_create(&key("g", "past-b"));
        clock.advance(Duration::seconds(60));
        let future = store.get_or_create(&key("g", "future"));
        clock.advance(Duration::seconds(60));

        assert_eq!(store.remove_expired(), 2);
        assert_eq!(store.len(), 1);
        assert!(Arc::ptr_eq(&future, &store.find(&key("g", "future")).unwrap()));
        assert!(past_a.is_expired());
        assert!(past_b.is_expired());
        assert!(store.find(&key("g", "past-a")).is_none());
        assert!(store.find(&key("g", "past-b")).is_none());
    }

    #[test]
    fn test_remove_expired_on_empty_store() {
        let (store, _) = store_with_clock(100);
        assert_eq!(store.remove_expired(), 0);
    }

    #[test]
    fn test_get_or_create_replaces_unswept_expired_session() {
        let (store, clock) = store_with_clock(100);
        let old = store.get_or_create(&key("g", "c"));

        clock.advance(Duration::seconds(101));
        let new = store.get_or_create(&key("g", "c"));

        assert!(!Arc::ptr_eq(&old, &new));
        assert!(old.is_expired());
        assert!(!new.is_expired());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_sessions_per_channel_are_independent() {
        let store = SessionStore::default();
        let a = store.get_or_create(&key("g", "c1"));
        let b = store.get_or_create(&key("g", "c2"));
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 2);
    }
}
