//! Per-user chat session registry.
//!
//! Owned by one [`ChatAdapter`](super::ChatAdapter) and dropped with it;
//! nothing is persisted. Creation is atomic under the registry lock, so a
//! user never ends up with two sessions.
//!
//! # Sender lanes
//!
//! Sends on one session are not ordered by default: two messages from the
//! same sender may be in flight at once. With
//! [`SessionPolicy::serialize_per_sender`] set, [`SessionRegistry::lane`]
//! hands out a per-sender async lock that the adapter holds for the whole
//! text completion.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionPolicy {
    pub serialize_per_sender: bool,
}

pub struct SessionRegistry<S> {
    policy: SessionPolicy,
    /// user id -> conversation handle
    sessions: Mutex<HashMap<String, Arc<S>>>,
    /// user id -> send lock (only populated when serializing)
    lanes: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S> SessionRegistry<S> {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            policy,
            sessions: Mutex::new(HashMap::new()),
            lanes: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Return the session for `user`, calling `create` only if none exists.
    pub async fn get_or_create<C>(&self, user: &str, create: C) -> Arc<S>
    where
        C: FnOnce() -> S,
    {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(user) {
            return existing.clone();
        }
        let session = Arc::new(create());
        sessions.insert(user.to_string(), session.clone());
        debug!(%user, total = sessions.len(), "chat session created");
        session
    }

    pub async fn contains(&self, user: &str) -> bool {
        self.sessions.lock().await.contains_key(user)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Acquire the sender's lane, or `None` when serialization is off.
    pub async fn lane(&self, user: &str) -> Option<OwnedMutexGuard<()>> {
        if !self.policy.serialize_per_sender {
            return None;
        }
        let lane = self
            .lanes
            .lock()
            .await
            .entry(user.to_string())
            .or_default()
            .clone();
        Some(lane.lock_owned().await)
    }
}

impl<S> Default for SessionRegistry<S> {
    fn default() -> Self {
        Self::new(SessionPolicy::default())
    }
}
