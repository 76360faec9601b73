use std::fmt;

use fantabase_core::text::trimmed_opt;
use fantabase_storage::keys::SESSION_ID_KEY;
use fantabase_storage::store::{read_lenient, write_lenient};
use fantabase_storage::KeyValueStore;
use tracing::info;

/// Opaque guest-session identifier, stable for the lifetime of the store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        SessionId(value.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn create_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Return the persisted session id, creating and persisting one if the
/// store has none. If persisting fails the id is still returned; the next
/// load will simply mint another.
pub fn get_or_create_session_id(store: &dyn KeyValueStore) -> SessionId {
    if let Some(existing) = trimmed_opt(read_lenient(store, SESSION_ID_KEY).as_deref()) {
        return SessionId(existing);
    }
    let id = create_session_id();
    write_lenient(store, SESSION_ID_KEY, &id);
    info!("created guest session {}", id);
    SessionId(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fantabase_core::error::FantabaseError;
    use fantabase_storage::MemoryStore;

    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> Result<Option<String>, FantabaseError> {
            Ok(None)
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), FantabaseError> {
            Err(FantabaseError::Storage("read only".into()))
        }
        fn remove(&self, _key: &str) -> Result<(), FantabaseError> {
            Err(FantabaseError::Storage("read only".into()))
        }
    }

    #[test]
    fn test_session_id_is_created_once() {
        let store = MemoryStore::new();
        let first = get_or_create_session_id(&store);
        let second = get_or_create_session_id(&store);
        assert_eq!(first, second);
        assert!(uuid::Uuid::parse_str(first.as_str()).is_ok());
    }

    #[test]
    fn test_existing_session_id_is_reused() {
        let store = MemoryStore::new();
        store.set(SESSION_ID_KEY, "persisted-id").unwrap();
        assert_eq!(get_or_create_session_id(&store).as_str(), "persisted-id");
    }

    #[test]
    fn test_blank_session_id_is_replaced() {
        let store = MemoryStore::new();
        store.set(SESSION_ID_KEY, "  ").unwrap();
        let id = get_or_create_session_id(&store);
        assert!(!id.as_str().trim().is_empty());
        assert_eq!(store.get(SESSION_ID_KEY).unwrap(), Some(id.to_string()));
    }

    #[test]
    fn test_unwritable_store_still_yields_id() {
        let id = get_or_create_session_id(&ReadOnlyStore);
        assert!(!id.as_str().is_empty());
    }
}
