// SPDX-FileCopyrightText: 2026 Doubao Bridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The session pool and its binding state machine.
//!
//! Per session: `Free -> Bound -> RateLimited -> Bound ...`, and any state
//! `-> Exhausted` on eviction. Exhausted is terminal: the slot is removed and
//! conversations that were bound to it resolve to `SessionNotFound`.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use doubao_core::{DoubaoError, Session};
use tracing::{debug, info, warn};

use crate::loader::load_sessions;

/// Stable handle for one pooled session. Assigned in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(usize);

impl SessionId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// A session handed out by [`SessionPool::acquire`].
///
/// The id is what the caller reports back through `bind` or `evict`.
#[derive(Debug, Clone)]
pub struct PooledSession {
    pub id: SessionId,
    pub session: Arc<Session>,
}

/// Pool-managed status of a session. Not stored on the record itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Free,
    Bound { conversation_ids: Vec<String> },
    RateLimited { conversation_ids: Vec<String> },
    Exhausted,
}

/// One line of [`SessionPool::snapshot`].
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    pub device_id: String,
    pub guest: bool,
    pub status: SessionStatus,
}

struct Slot {
    session: Arc<Session>,
    rate_limited: bool,
}

enum Binding {
    Active(SessionId),
    /// The bound session was evicted. Kept so follow-up turns fail instead of
    /// silently continuing the conversation on another account.
    Evicted,
}

#[derive(Default)]
struct PoolState {
    slots: BTreeMap<SessionId, Slot>,
    bindings: HashMap<String, Binding>,
    evicted: HashSet<SessionId>,
}

impl PoolState {
    fn conversations_of(&self, id: SessionId) -> Vec<String> {
        let mut ids: Vec<String> = self
            .bindings
            .iter()
            .filter(|(_, binding)| matches!(binding, Binding::Active(bound) if *bound == id))
            .map(|(conversation_id, _)| conversation_id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn status(&self, id: SessionId) -> Option<SessionStatus> {
        if self.evicted.contains(&id) {
            return Some(SessionStatus::Exhausted);
        }
        let slot = self.slots.get(&id)?;
        let conversation_ids = self.conversations_of(id);
        Some(if slot.rate_limited {
            SessionStatus::RateLimited { conversation_ids }
        } else if conversation_ids.is_empty() {
            SessionStatus::Free
        } else {
            SessionStatus::Bound { conversation_ids }
        })
    }

    /// First session matching `guest`, preferring ones not flagged as rate
    /// limited.
    fn select(&self, guest: Option<bool>) -> Option<SessionId> {
        let mut fallback = None;
        for (id, slot) in &self.slots {
            if guest.is_some_and(|g| g != slot.session.guest) {
                continue;
            }
            if !slot.rate_limited {
                return Some(*id);
            }
            fallback.get_or_insert(*id);
        }
        fallback
    }
}

/// Shared credential pool. All operations take one internal lock.
pub struct SessionPool {
    state: Mutex<PoolState>,
}

impl SessionPool {
    pub fn new(sessions: Vec<Session>) -> Self {
        let slots = sessions
            .into_iter()
            .enumerate()
            .map(|(index, session)| {
                (
                    SessionId(index),
                    Slot {
                        session: Arc::new(session),
                        rate_limited: false,
                    },
                )
            })
            .collect();
        Self {
            state: Mutex::new(PoolState {
                slots,
                ..PoolState::default()
            }),
        }
    }

    /// Loads the pool from a session document on disk.
    pub fn from_path(path: &Path) -> Result<Self, DoubaoError> {
        let sessions = load_sessions(path)?;
        info!(path = %path.display(), count = sessions.len(), "loaded session pool");
        Ok(Self::new(sessions))
    }

    fn lock(&self) -> Result<MutexGuard<'_, PoolState>, DoubaoError> {
        self.state
            .lock()
            .map_err(|e| DoubaoError::Internal(format!("session pool lock poisoned: {e}")))
    }

    /// Returns the session bound to `conversation_id`, or selects a usable
    /// one when the conversation is unknown.
    ///
    /// `guest` restricts a new selection to guest (`Some(true)`) or
    /// logged-in (`Some(false)`) sessions. It does not apply to an existing
    /// binding. Selection does not bind; report the outcome with
    /// [`bind`](Self::bind).
    pub fn acquire(
        &self,
        conversation_id: Option<&str>,
        guest: Option<bool>,
    ) -> Result<PooledSession, DoubaoError> {
        let state = self.lock()?;
        let not_found = || DoubaoError::SessionNotFound {
            conversation_id: conversation_id.map(str::to_string),
        };

        if let Some(conversation_id) = conversation_id {
            match state.bindings.get(conversation_id) {
                Some(Binding::Active(id)) => {
                    let slot = state.slots.get(id).ok_or_else(not_found)?;
                    debug!(%id, conversation_id, "reusing bound session");
                    return Ok(PooledSession {
                        id: *id,
                        session: Arc::clone(&slot.session),
                    });
                }
                Some(Binding::Evicted) => {
                    warn!(conversation_id, "conversation's session was evicted");
                    return Err(not_found());
                }
                None => {}
            }
        }

        let id = state.select(guest).ok_or_else(not_found)?;
        let slot = state.slots.get(&id).ok_or_else(not_found)?;
        debug!(%id, rate_limited = slot.rate_limited, "selected session");
        Ok(PooledSession {
            id,
            session: Arc::clone(&slot.session),
        })
    }

    /// Records the sticky binding of `conversation_id` to `id`.
    ///
    /// `rate_limited` flags the session; a later successful bind clears the
    /// flag. Fails with `SessionNotFound` if the session was evicted in the
    /// meantime.
    pub fn bind(
        &self,
        conversation_id: &str,
        id: SessionId,
        rate_limited: bool,
    ) -> Result<(), DoubaoError> {
        let mut state = self.lock()?;
        let Some(slot) = state.slots.get_mut(&id) else {
            return Err(DoubaoError::SessionNotFound {
                conversation_id: Some(conversation_id.to_string()),
            });
        };
        slot.rate_limited = rate_limited;
        state
            .bindings
            .insert(conversation_id.to_string(), Binding::Active(id));
        if rate_limited {
            warn!(%id, conversation_id, "session rate limited, binding kept");
        } else {
            debug!(%id, conversation_id, "conversation bound");
        }
        Ok(())
    }

    /// Flags `id` as rate limited without binding a conversation.
    ///
    /// Used when the platform refuses a turn before it assigned a
    /// conversation id. Returns `false` if the session is gone.
    pub fn mark_rate_limited(&self, id: SessionId) -> Result<bool, DoubaoError> {
        let mut state = self.lock()?;
        let Some(slot) = state.slots.get_mut(&id) else {
            return Ok(false);
        };
        slot.rate_limited = true;
        warn!(%id, "session rate limited before a conversation was assigned");
        Ok(true)
    }

    /// Permanently removes `id` and invalidates every binding pointing to it.
    ///
    /// Returns `false` if the session was already gone.
    pub fn evict(&self, id: SessionId) -> Result<bool, DoubaoError> {
        let mut state = self.lock()?;
        if state.slots.remove(&id).is_none() {
            return Ok(false);
        }
        state.evicted.insert(id);
        let mut dropped = 0usize;
        for binding in state.bindings.values_mut() {
            if matches!(binding, Binding::Active(bound) if *bound == id) {
                *binding = Binding::Evicted;
                dropped += 1;
            }
        }
        info!(%id, dropped_bindings = dropped, remaining = state.slots.len(), "session evicted");
        Ok(true)
    }

    /// Current status of `id`, or `None` for an id this pool never issued.
    pub fn status(&self, id: SessionId) -> Result<Option<SessionStatus>, DoubaoError> {
        Ok(self.lock()?.status(id))
    }

    /// Point-in-time view of every session, evicted ones included.
    pub fn snapshot(&self) -> Result<Vec<SessionSummary>, DoubaoError> {
        let state = self.lock()?;
        let mut ids: Vec<SessionId> = state
            .slots
            .keys()
            .chain(state.evicted.iter())
            .copied()
            .collect();
        ids.sort();
        Ok(ids
            .into_iter()
            .filter_map(|id| {
                let status = state.status(id)?;
                let (device_id, guest) = state
                    .slots
                    .get(&id)
                    .map(|slot| (slot.session.device_id.clone(), slot.session.guest))
                    .unwrap_or_default();
                Some(SessionSummary {
                    id,
                    device_id,
                    guest,
                    status,
                })
            })
            .collect())
    }

    /// Number of sessions still usable.
    pub fn available(&self) -> Result<usize, DoubaoError> {
        Ok(self.lock()?.slots.len())
    }
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.lock() {
            Ok(state) => f
                .debug_struct("SessionPool")
                .field("sessions", &state.slots.len())
                .field("bindings", &state.bindings.len())
                .field("evicted", &state.evicted.len())
                .finish(),
            Err(_) => f.write_str("SessionPool(<poisoned>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doubao_test_utils::{guest_session, test_session};

    fn pool_of(n: usize) -> SessionPool {
        SessionPool::new((0..n).map(test_session).collect())
    }

    #[test]
    fn empty_pool_is_not_found() {
        let pool = SessionPool::new(Vec::new());
        let err = pool.acquire(None, None).unwrap_err();
        assert!(matches!(err, DoubaoError::SessionNotFound { conversation_id: None }));
    }

    #[test]
    fn binding_is_sticky() {
        let pool = pool_of(3);
        let first = pool.acquire(None, None).unwrap();
        pool.bind("conv-1", first.id, false).unwrap();

        let again = pool.acquire(Some("conv-1"), None).unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(
            pool.status(first.id).unwrap(),
            Some(SessionStatus::Bound {
                conversation_ids: vec!["conv-1".into()]
            })
        );
    }

    #[test]
    fn unknown_conversation_gets_a_fresh_selection() {
        let pool = pool_of(2);
        let picked = pool.acquire(Some("never-seen"), None).unwrap();
        assert_eq!(picked.id, SessionId(0));
        assert_eq!(pool.status(picked.id).unwrap(), Some(SessionStatus::Free));
    }

    #[test]
    fn rate_limit_keeps_binding_and_flags_session() {
        let pool = pool_of(2);
        let s = pool.acquire(None, None).unwrap();
        pool.bind("conv-1", s.id, true).unwrap();

        assert_eq!(pool.acquire(Some("conv-1"), None).unwrap().id, s.id);
        assert_eq!(
            pool.status(s.id).unwrap(),
            Some(SessionStatus::RateLimited {
                conversation_ids: vec!["conv-1".into()]
            })
        );

        // New conversations prefer a session that is not flagged.
        assert_eq!(pool.acquire(None, None).unwrap().id, SessionId(1));

        pool.bind("conv-1", s.id, false).unwrap();
        assert!(matches!(
            pool.status(s.id).unwrap(),
            Some(SessionStatus::Bound { .. })
        ));
    }

    #[test]
    fn rate_limited_session_is_still_selectable_as_last_resort() {
        let pool = pool_of(1);
        let s = pool.acquire(None, None).unwrap();
        pool.bind("conv-1", s.id, true).unwrap();
        assert_eq!(pool.acquire(None, None).unwrap().id, s.id);
    }

    #[test]
    fn unbound_session_can_be_flagged_rate_limited() {
        let pool = pool_of(2);
        let s = pool.acquire(None, None).unwrap();
        assert!(pool.mark_rate_limited(s.id).unwrap());
        assert_eq!(
            pool.status(s.id).unwrap(),
            Some(SessionStatus::RateLimited {
                conversation_ids: Vec::new()
            })
        );
        assert_ne!(pool.acquire(None, None).unwrap().id, s.id);

        pool.evict(s.id).unwrap();
        assert!(!pool.mark_rate_limited(s.id).unwrap());
    }

    #[test]
    fn eviction_is_permanent() {
        let pool = pool_of(2);
        let s = pool.acquire(None, None).unwrap();
        pool.bind("conv-1", s.id, false).unwrap();

        assert!(pool.evict(s.id).unwrap());
        assert!(!pool.evict(s.id).unwrap());
        assert_eq!(pool.status(s.id).unwrap(), Some(SessionStatus::Exhausted));

        let err = pool.acquire(Some("conv-1"), None).unwrap_err();
        assert!(matches!(
            err,
            DoubaoError::SessionNotFound { conversation_id: Some(ref c) } if c == "conv-1"
        ));
        assert_eq!(pool.acquire(None, None).unwrap().id, SessionId(1));
        assert!(pool.bind("conv-2", s.id, false).is_err());
    }

    #[test]
    fn guest_filter_applies_to_new_selection_only() {
        let pool = SessionPool::new(vec![test_session(0), guest_session(1)]);
        assert_eq!(pool.acquire(None, Some(true)).unwrap().id, SessionId(1));
        assert_eq!(pool.acquire(None, Some(false)).unwrap().id, SessionId(0));

        pool.bind("conv-1", SessionId(0), false).unwrap();
        assert_eq!(
            pool.acquire(Some("conv-1"), Some(true)).unwrap().id,
            SessionId(0)
        );

        pool.evict(SessionId(1)).unwrap();
        assert!(pool.acquire(None, Some(true)).is_err());
    }

    #[test]
    fn snapshot_lists_evicted_sessions() {
        let pool = pool_of(2);
        pool.evict(SessionId(0)).unwrap();
        let snapshot = pool.snapshot().unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].status, SessionStatus::Exhausted);
        assert_eq!(snapshot[1].status, SessionStatus::Free);
        assert_eq!(snapshot[1].device_id, "device-1");
        assert_eq!(pool.available().unwrap(), 1);
    }
}
