//! The single authenticated portal session and its store

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

/// Authenticated context required to issue any vehicle command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Session {
    /// Portal session token, sent as cookie and form field on every call
    #[serde(skip_serializing)]
    pub token: String,
    /// Expiry in seconds since the epoch, decoded from the token claims
    pub expires_at: i64,
    /// Upstream registration id of the configured vehicle
    pub registration_id: String,
}

impl Session {
    pub fn new(
        token: impl Into<String>,
        expires_at: i64,
        registration_id: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            expires_at,
            registration_id: registration_id.into(),
        }
    }

    /// Seconds of validity left at `now` (negative once expired)
    pub fn remaining(&self, now: i64) -> i64 {
        self.expires_at - now
    }
}

/// Holds exactly one live [`Session`].
///
/// Sessions are swapped in whole behind an `Arc`, so a reader holding a
/// session keeps a consistent snapshot even while a renewal replaces it.
#[derive(Debug, Default)]
pub struct SessionStore {
    current: RwLock<Option<Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current session, if any login has succeeded yet
    pub fn current(&self) -> Option<Arc<Session>> {
        self.current.read().clone()
    }

    /// Replace the current session wholesale, returning the new snapshot
    pub fn replace(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        *self.current.write() = Some(session.clone());
        session
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_store_starts_absent() {
        let store = SessionStore::new();
        assert!(store.current().is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_replace_discards_old_session() {
        let store = SessionStore::new();
        store.replace(Session::new("JWT-old", 100, "reg-1"));
        let old = store.current().unwrap();

        store.replace(Session::new("JWT-new", 200, "reg-2"));
        let new = store.current().unwrap();

        assert_eq!(new.token, "JWT-new");
        assert_eq!(new.expires_at, 200);
        assert_eq!(new.registration_id, "reg-2");
        // An earlier snapshot is unaffected by the swap
        assert_eq!(old.token, "JWT-old");
        assert_eq!(old.expires_at, 100);
    }

    #[test]
    fn test_remaining() {
        let session = Session::new("t", 1_000, "r");
        assert_eq!(session.remaining(400), 600);
        assert_eq!(session.remaining(1_500), -500);
    }

    #[test]
    fn test_token_not_serialized() {
        let session = Session::new("secret-token", 42, "reg");
        let json = serde_json::to_value(&session).unwrap();
        assert!(json.get("token").is_none());
        assert_eq!(json["expires_at"], 42);
        assert_eq!(json["registration_id"], "reg");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_never_see_mixed_session() {
        let store = Arc::new(SessionStore::new());
        store.replace(Session::new("token-0", 0, "reg-0"));

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for n in 1..=2_000i64 {
                    store.replace(Session::new(format!("token-{n}"), n, format!("reg-{n}")));
                    if n % 64 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };

        let mut readers = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            readers.push(tokio::spawn(async move {
                for _ in 0..2_000 {
                    let session = store.current().unwrap();
                    let n = session.expires_at;
                    assert_eq!(session.token, format!("token-{n}"));
                    assert_eq!(session.registration_id, format!("reg-{n}"));
                    tokio::task::yield_now().await;
                }
            }));
        }

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(store.current().unwrap().expires_at, 2_000);
    }
}
