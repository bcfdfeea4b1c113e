use std::collections::HashMap;
use std::sync::Arc;

use menuguard_core::domain::session::{Session, SessionId};
use tokio::sync::{Mutex, RwLock};

/// Keyed session table. The map lock only guards lookup and insertion; each
/// session carries its own mutex so unrelated sessions never wait on each other.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session handle and whether it was created by this call.
    pub async fn get_or_create(&self, id: &SessionId) -> (Arc<Mutex<Session>>, bool) {
        if let Some(existing) = self.sessions.read().await.get(id) {
            return (Arc::clone(existing), false);
        }

        let mut sessions = self.sessions.write().await;
        let mut created = false;
        let handle = sessions
            .entry(id.clone())
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(Session::new(id.clone())))
            })
            .clone();
        (handle, created)
    }

    pub async fn get(&self, id: &SessionId) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &SessionId) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use menuguard_core::domain::allergen::Allergen;
    use menuguard_core::domain::session::SessionId;

    use super::SessionStore;

    #[tokio::test]
    async fn first_lookup_creates_and_later_lookups_share() {
        let store = SessionStore::new();
        let id = SessionId::new("table-4");

        let (first, created) = store.get_or_create(&id).await;
        assert!(created);
        first.lock().await.merge_constraints([Allergen::Soy]);

        let (second, created) = store.get_or_create(&id).await;
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.lock().await.constraints.contains(&Allergen::Soy));
    }

    #[tokio::test]
    async fn sessions_are_isolated_and_removable() {
        let store = SessionStore::new();
        let (a, _) = store.get_or_create(&SessionId::new("a")).await;
        let (b, _) = store.get_or_create(&SessionId::new("b")).await;

        a.lock().await.merge_constraints([Allergen::Peanuts]);
        assert!(b.lock().await.constraints.is_empty());
        assert_eq!(store.len().await, 2);

        assert!(store.remove(&SessionId::new("a")).await);
        assert!(!store.remove(&SessionId::new("a")).await);
        assert!(store.get(&SessionId::new("a")).await.is_none());
    }

    #[tokio::test]
    async fn holding_one_session_lock_does_not_block_another() {
        let store = Arc::new(SessionStore::new());
        let (a, _) = store.get_or_create(&SessionId::new("a")).await;
        let _held = a.lock().await;

        let other = Arc::clone(&store);
        let result = tokio::time::timeout(std::time::Duration::from_secs(1), async move {
            let (b, _) = other.get_or_create(&SessionId::new("b")).await;
            let mut session = b.lock().await;
            session.merge_constraints([Allergen::Fish]);
        })
        .await;

        assert!(result.is_ok());
    }
}
