use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::events::EventDispatcher;
use crate::session::{SessionId, SessionState};

/// Every live session, keyed by id.
///
/// Built once per process and shared by reference. Only bookkeeping happens
/// here; disconnecting the provider is the coordinator's job.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionId, Arc<SessionState>>>,
    dispatcher: EventDispatcher,
}

impl SessionRegistry {
    pub fn new(dispatcher: EventDispatcher) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            dispatcher,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<SessionState>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the session, constructing it under the map lock if absent so
    /// concurrent callers never build two states for one id.
    pub fn get_or_create(&self, session_id: &str) -> Arc<SessionState> {
        let mut sessions = self.lock();
        if let Some(state) = sessions.get(session_id) {
            return state.clone();
        }
        tracing::debug!(session = session_id, "creating session state");
        let state = Arc::new(SessionState::new(session_id, self.dispatcher.clone()));
        sessions.insert(session_id.to_string(), state.clone());
        state
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionState>> {
        self.lock().get(session_id).cloned()
    }

    /// Idempotent: removing an unknown id returns `None`.
    pub fn remove(&self, session_id: &str) -> Option<Arc<SessionState>> {
        self.lock().remove(session_id)
    }

    /// Takes every entry out of the registry.
    pub fn remove_all(&self) -> Vec<Arc<SessionState>> {
        self.lock().drain().map(|(_, state)| state).collect()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ConnectionStatus;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(EventDispatcher::new())
    }

    #[test]
    fn get_or_create_returns_same_state() {
        let reg = registry();
        let a = reg.get_or_create("room1");
        let b = reg.get_or_create("room1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn get_does_not_create() {
        let reg = registry();
        assert!(reg.get("room1").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let reg = registry();
        reg.get_or_create("room1");
        assert!(reg.remove("room1").is_some());
        assert!(reg.remove("room1").is_none());
        assert!(reg.remove("never").is_none());
    }

    #[test]
    fn recreated_session_starts_fresh() {
        let reg = registry();
        let first = reg.get_or_create("room1");
        first.begin_connect();
        first.on_connected();
        reg.remove("room1");

        let second = reg.get_or_create("room1");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.status(), ConnectionStatus::Idle);
    }

    #[test]
    fn remove_all_empties_registry() {
        let reg = registry();
        reg.get_or_create("b");
        reg.get_or_create("a");
        assert_eq!(reg.session_ids(), vec!["a".to_string(), "b".to_string()]);

        let removed = reg.remove_all();
        assert_eq!(removed.len(), 2);
        assert!(reg.is_empty());
    }

    #[test]
    fn concurrent_get_or_create_constructs_once() {
        let reg = Arc::new(registry());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let reg = reg.clone();
                std::thread::spawn(move || reg.get_or_create("room1"))
            })
            .collect();

        let states: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(states.iter().all(|s| Arc::ptr_eq(s, &states[0])));
        assert_eq!(reg.len(), 1);
    }
}
