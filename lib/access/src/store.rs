//! Session storage.
//!
//! The store is the only cross-request mutable state in the gateway.
//! Implementations must key strictly by [`SessionId`] and never hold a lock
//! across an `.await`; concurrent writes to the same ID are last-write-wins.
//! Per-request activity goes through [`SessionStore::touch`], which never
//! recreates a session another request has removed.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicUsize, Ordering};
use oidc_gate_core::{Result, SessionId};

use crate::error::SessionStorageError;
use crate::session::Session;

/// Storage backend for browser sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads a session by ID.
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, SessionStorageError>;

    /// Inserts or replaces a session.
    async fn save(&self, session: &Session) -> Result<(), SessionStorageError>;

    /// Records activity on an existing session.
    ///
    /// Returns `false` without inserting anything if the session is gone.
    async fn touch(&self, id: &SessionId, now: DateTime<Utc>)
        -> Result<bool, SessionStorageError>;

    /// Removes a session. Removing an unknown ID is not an error.
    async fn remove(&self, id: &SessionId) -> Result<(), SessionStorageError>;

    /// Removes sessions idle for at least `idle_timeout`, returning how many.
    async fn purge_idle(&self, idle_timeout: Duration) -> Result<u64, SessionStorageError>;
}

/// In-process session store backed by a sharded concurrent map.
///
/// Sessions do not survive a restart. Reads and writes for different IDs
/// land on independent shards and do not contend.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: DashMap<SessionId, Session>,
    occupied: AtomicUsize,
    capacity: Option<usize>,
}

impl MemorySessionStore {
    /// Creates an unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            occupied: AtomicUsize::new(0),
            capacity: None,
        }
    }

    /// Creates a store that refuses new sessions beyond `capacity`.
    #[must_use]
    pub fn with_capacity_limit(capacity: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            occupied: AtomicUsize::new(0),
            capacity: Some(capacity),
        }
    }

    /// Claims a slot for a new session, failing if the store is full.
    fn reserve_slot(&self) -> bool {
        let limit = self.capacity.unwrap_or(usize::MAX);
        self.occupied
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .is_ok()
    }

    fn release_slot(&self) {
        self.occupied.fetch_sub(1, Ordering::AcqRel);
    }

    /// Returns the number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no sessions are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<Session>, SessionStorageError> {
        Ok(self.sessions.get(id).map(|entry| entry.value().clone()))
    }

    async fn save(&self, session: &Session) -> Result<(), SessionStorageError> {
        match self.sessions.entry(session.id().clone()) {
            Entry::Occupied(mut entry) => {
                entry.insert(session.clone());
            }
            Entry::Vacant(entry) => {
                if !self.reserve_slot() {
                    let capacity = self.capacity.unwrap_or(usize::MAX);
                    return Err(SessionStorageError::CapacityExceeded { capacity }.into());
                }
                entry.insert(session.clone());
            }
        }
        Ok(())
    }

    async fn touch(
        &self,
        id: &SessionId,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionStorageError> {
        match self.sessions.get_mut(id) {
            Some(mut entry) => {
                entry.touch(now);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove(&self, id: &SessionId) -> Result<(), SessionStorageError> {
        if self.sessions.remove(id).is_some() {
            self.release_slot();
        }
        Ok(())
    }

    async fn purge_idle(&self, idle_timeout: Duration) -> Result<u64, SessionStorageError> {
        let now = Utc::now();
        let mut removed = 0usize;
        self.sessions.retain(|_, session| {
            let keep = !session.is_idle(idle_timeout, now);
            if !keep {
                removed += 1;
                self.release_slot();
            }
            keep
        });
        if removed > 0 {
            tracing::debug!(removed, "purged idle sessions");
        }
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenBundle;
    use std::sync::Arc;

    fn session() -> Session {
        Session::new(SessionId::generate().expect("generate"))
    }

    #[tokio::test]
    async fn load_unknown_session_returns_none() {
        let store = MemorySessionStore::new();
        let id = SessionId::generate().expect("generate");

        assert!(store.load(&id).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn save_then_load_round_trips_tokens() {
        let store = MemorySessionStore::new();
        let mut session = session();
        session.materialize(TokenBundle::new(
            "abc123".to_string(),
            "Bearer".to_string(),
        ));
        store.save(&session).await.expect("save");

        let loaded = store
            .load(session.id())
            .await
            .expect("load")
            .expect("present");
        let tokens = loaded.tokens().expect("tokens");
        assert_eq!(tokens.access_token().secret(), "abc123");
        assert_eq!(tokens.token_type(), "Bearer");
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = MemorySessionStore::new();
        let session = session();
        store.save(&session).await.expect("save");

        store.remove(session.id()).await.expect("remove");
        store.remove(session.id()).await.expect("remove again");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn capacity_limit_rejects_new_sessions_only() {
        let store = MemorySessionStore::with_capacity_limit(1);
        let mut first = session();
        store.save(&first).await.expect("save first");

        let err = store.save(&session()).await.unwrap_err();
        assert_eq!(
            err.current_context(),
            &SessionStorageError::CapacityExceeded { capacity: 1 }
        );

        first.materialize(TokenBundle::new("abc".to_string(), "Bearer".to_string()));
        store.save(&first).await.expect("update existing");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn touch_updates_activity_without_replacing_tokens() {
        let store = MemorySessionStore::new();
        let mut session = session();
        session.materialize(TokenBundle::new("abc".to_string(), "Bearer".to_string()));
        session.touch(Utc::now() - Duration::hours(2));
        store.save(&session).await.expect("save");

        let now = Utc::now();
        assert!(store.touch(session.id(), now).await.expect("touch"));

        let loaded = store
            .load(session.id())
            .await
            .expect("load")
            .expect("present");
        assert_eq!(loaded.last_seen_at(), now);
        assert!(loaded.is_authenticated());
    }

    #[tokio::test]
    async fn touch_does_not_recreate_removed_session() {
        let store = MemorySessionStore::new();
        let mut session = session();
        session.materialize(TokenBundle::new("abc".to_string(), "Bearer".to_string()));
        store.save(&session).await.expect("save");

        // A logout removes the session while another request still holds it.
        let in_flight = store
            .load(session.id())
            .await
            .expect("load")
            .expect("present");
        store.remove(session.id()).await.expect("remove");

        assert!(!store.touch(in_flight.id(), Utc::now()).await.expect("touch"));
        assert!(store.load(session.id()).await.expect("load").is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn capacity_limit_holds_under_concurrent_inserts() {
        let store = Arc::new(MemorySessionStore::with_capacity_limit(8));
        let mut handles = Vec::new();
        for _ in 0..64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move { store.save(&session()).await.is_ok() }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.expect("join") {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 8);
        assert_eq!(store.len(), 8);
    }

    #[tokio::test]
    async fn removal_frees_capacity() {
        let store = MemorySessionStore::with_capacity_limit(1);
        let first = session();
        store.save(&first).await.expect("save first");
        store.remove(first.id()).await.expect("remove");

        store.save(&session()).await.expect("slot is free again");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn purge_idle_removes_only_stale_sessions() {
        let store = MemorySessionStore::new();
        let mut stale = session();
        stale.touch(Utc::now() - Duration::hours(2));
        let fresh = session();
        store.save(&stale).await.expect("save stale");
        store.save(&fresh).await.expect("save fresh");

        let removed = store.purge_idle(Duration::hours(1)).await.expect("purge");

        assert_eq!(removed, 1);
        assert!(store.load(stale.id()).await.expect("load").is_none());
        assert!(store.load(fresh.id()).await.expect("load").is_some());
    }

    #[tokio::test]
    async fn concurrent_writes_to_distinct_sessions() {
        let store = Arc::new(MemorySessionStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut session = Session::new(SessionId::generate().expect("generate"));
                session.materialize(TokenBundle::new(format!("token-{i}"), "Bearer".to_string()));
                store.save(&session).await.expect("save");
                session
            }));
        }

        for handle in handles {
            let session = handle.await.expect("join");
            let loaded = store
                .load(session.id())
                .await
                .expect("load")
                .expect("present");
            assert_eq!(
                loaded.tokens().expect("tokens").access_token().secret(),
                session.tokens().expect("tokens").access_token().secret()
            );
        }
        assert_eq!(store.len(), 32);
    }

    #[tokio::test]
    async fn racing_writes_to_same_session_leave_one_complete_bundle() {
        let store = Arc::new(MemorySessionStore::new());
        let id = SessionId::generate().expect("generate");
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let mut session = Session::new(id);
                session.materialize(TokenBundle::new(format!("token-{i}"), "Bearer".to_string()));
                store.save(&session).await.expect("save");
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }

        let loaded = store.load(&id).await.expect("load").expect("present");
        let tokens = loaded.tokens().expect("tokens");
        assert!(tokens.access_token().secret().starts_with("token-"));
        assert_eq!(tokens.token_type(), "Bearer");
    }
}
