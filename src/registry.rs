//! Broadcast registry: the set of live sessions.
//!
//! A session joins once its connection is established and leaves when its
//! read loop ends. [`Registry::deliver`] hands the same reference-counted
//! payload to every member's writer, so fan-out never copies the payload.
//!
//! The membership map sits behind a `std::sync::Mutex` that is never held
//! across an `.await`: delivery snapshots the members, releases the lock,
//! then enqueues on each writer without waiting.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::broadcast;

use crate::session::{Session, SessionId};

/// Capacity of the membership event channel.
const EVENT_CAPACITY: usize = 256;

/// Change in registry membership.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipEvent {
    /// A session joined.
    Joined {
        /// Session that joined.
        id: SessionId,
        /// Peer label.
        peer: String,
    },
    /// A session left.
    Left {
        /// Session that left.
        id: SessionId,
        /// Peer label.
        peer: String,
    },
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Sessions the payload was queued for.
    pub delivered: usize,
    /// Sessions whose queue was full or whose writer had stopped.
    pub failed: usize,
}

impl DeliveryReport {
    /// Number of sessions attempted.
    pub fn attempted(&self) -> usize {
        self.delivered + self.failed
    }
}

/// Set of live sessions keyed by id.
pub struct Registry {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    events: broadcast::Sender<MembershipEvent>,
    next_id: AtomicU64,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sessions: Mutex::new(HashMap::new()),
            events,
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<Session>>> {
        // The map stays consistent even if a holder panicked.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a fresh session id.
    pub fn next_session_id(&self) -> SessionId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add a session. Returns `false` if it is already a member.
    pub fn join(&self, session: Arc<Session>) -> bool {
        let id = session.id();
        let peer = session.peer().to_string();

        let members = {
            let mut sessions = self.lock();
            if sessions.contains_key(&id) {
                return false;
            }
            sessions.insert(id, session);
            sessions.len()
        };

        tracing::info!(session = id, peer = %peer, members, "session joined");
        let _ = self.events.send(MembershipEvent::Joined { id, peer });
        true
    }

    /// Remove a session. Removing an absent session is a no-op returning `false`.
    pub fn leave(&self, id: SessionId) -> bool {
        let (removed, members) = {
            let mut sessions = self.lock();
            let removed = sessions.remove(&id);
            (removed, sessions.len())
        };

        let Some(session) = removed else {
            return false;
        };

        let peer = session.peer().to_string();
        tracing::info!(session = id, peer = %peer, members, "session left");
        let _ = self.events.send(MembershipEvent::Left { id, peer });
        true
    }

    /// Queue `payload` on every member.
    ///
    /// Best effort: a member that cannot take the frame is counted in
    /// `failed` and skipped; the others still receive it.
    pub fn deliver(&self, payload: Bytes) -> DeliveryReport {
        self.fan_out(payload, None)
    }

    /// Queue `payload` on every member except `sender`.
    pub fn deliver_except(&self, payload: Bytes, sender: SessionId) -> DeliveryReport {
        self.fan_out(payload, Some(sender))
    }

    fn fan_out(&self, payload: Bytes, skip: Option<SessionId>) -> DeliveryReport {
        let targets: Vec<Arc<Session>> = self
            .lock()
            .values()
            .filter(|s| Some(s.id()) != skip)
            .cloned()
            .collect();

        let mut report = DeliveryReport::default();
        for session in targets {
            match session.deliver(payload.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(session = session.id(), error = %e, "delivery failed");
                }
            }
        }

        tracing::trace!(
            bytes = payload.len(),
            delivered = report.delivered,
            failed = report.failed,
            "fan-out"
        );
        report
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the registry has no members.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `id` is a member.
    pub fn contains(&self, id: SessionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Ids of all members, sorted.
    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Subscribe to join/leave events.
    ///
    /// Events are sent only on actual membership changes.
    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events.subscribe()
    }

    /// Ask every member to close. Each leaves from its own read loop.
    pub fn close_all(&self) {
        let members: Vec<Arc<Session>> = self.lock().values().cloned().collect();
        for session in members {
            session.close();
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("members", &self.session_ids())
            .finish()
    }
}
