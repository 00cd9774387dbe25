//! Session Registry
//!
//! Tracks every open connection under its participant identifier and fans
//! messages out to them. The registry exclusively owns each session's outbound
//! channel; the connection's writer task holds the receiving end.

use std::collections::BTreeMap;
use std::time::Duration;
use futures_util::future::join_all;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, trace};

use crate::game::state::PlayerId;
use crate::network::protocol::Message;

/// Outbound half of a live session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Messages queued for the connection's writer task.
    sender: mpsc::Sender<Message>,
}

impl SessionHandle {
    /// Wrap a writer channel.
    pub fn new(sender: mpsc::Sender<Message>) -> Self {
        Self { sender }
    }

    /// Queue without waiting. False if the channel is full or closed.
    fn try_deliver(&self, id: &PlayerId, msg: Message) -> bool {
        match self.sender.try_send(msg) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Outbound queue full for {}, dropping", id.short());
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Outbound channel closed for {}", id.short());
                false
            }
        }
    }

    /// Queue, waiting at most `timeout` for room. False on timeout or close.
    async fn deliver_within(&self, id: &PlayerId, msg: Message, timeout: Duration) -> bool {
        match self.sender.send_timeout(msg, timeout).await {
            Ok(()) => true,
            Err(mpsc::error::SendTimeoutError::Timeout(_)) => {
                debug!("Outbound queue for {} stayed full for {:?}", id.short(), timeout);
                false
            }
            Err(mpsc::error::SendTimeoutError::Closed(_)) => {
                trace!("Outbound channel closed for {}", id.short());
                false
            }
        }
    }
}

// =============================================================================
// SESSION REGISTRY
// =============================================================================

/// All currently open sessions.
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<PlayerId, SessionHandle>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register a connection and return its freshly issued identifier.
    pub async fn register(&self, sender: mpsc::Sender<Message>) -> PlayerId {
        let mut sessions = self.sessions.write().await;
        let id = loop {
            let candidate = PlayerId::generate();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        sessions.insert(id.clone(), SessionHandle::new(sender));
        id
    }

    /// Remove a session. Returns false if it was already gone.
    pub async fn unregister(&self, id: &PlayerId) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id).is_some()
    }

    /// Deliver `msg` to every session except `sender_id`.
    ///
    /// Never waits on a slow peer: full or closed channels are skipped.
    /// Returns the number of sessions the message was queued for.
    pub async fn broadcast_except(&self, sender_id: &PlayerId, msg: &Message) -> usize {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .filter(|(id, _)| *id != sender_id)
            .filter(|(id, handle)| handle.try_deliver(id, msg.clone()))
            .count()
    }

    /// Deliver `msg` to every session except `sender_id`, giving each full
    /// queue up to `timeout` to make room.
    ///
    /// For messages a peer must not miss. The registry lock is released
    /// before waiting, and all peers are waited on concurrently.
    pub async fn broadcast_except_within(
        &self,
        sender_id: &PlayerId,
        msg: &Message,
        timeout: Duration,
    ) -> usize {
        let targets: Vec<(PlayerId, SessionHandle)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .filter(|(id, _)| *id != sender_id)
                .map(|(id, handle)| (id.clone(), handle.clone()))
                .collect()
        };

        join_all(
            targets
                .iter()
                .map(|(id, handle)| handle.deliver_within(id, msg.clone(), timeout)),
        )
        .await
        .into_iter()
        .filter(|delivered| *delivered)
        .count()
    }

    /// Number of open sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
