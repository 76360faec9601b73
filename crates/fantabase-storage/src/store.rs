use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use fantabase_core::error::FantabaseError;
use tracing::warn;

/// String key-value storage that outlives a single widget session.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, FantabaseError>;
    fn set(&self, key: &str, value: &str) -> Result<(), FantabaseError>;
    fn remove(&self, key: &str) -> Result<(), FantabaseError>;
}

// ---------------------------------------------------------------------------
// Lenient access
//
// Widget code never surfaces storage failures: reads degrade to "absent" and
// writes become no-ops, both logged.
// ---------------------------------------------------------------------------

pub fn read_lenient(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!("storage read failed key={} error={}", key, e);
            None
        }
    }
}

pub fn write_lenient(store: &dyn KeyValueStore, key: &str, value: &str) {
    if let Err(e) = store.set(key, value) {
        warn!("storage write failed key={} error={}", key, e);
    }
}

pub fn remove_lenient(store: &dyn KeyValueStore, key: &str) {
    if let Err(e) = store.remove(key) {
        warn!("storage remove failed key={} error={}", key, e);
    }
}

/// Process-local store. Nothing survives the process; used by tests and as
/// the fallback when no data directory is usable.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, FantabaseError> {
        Ok(self.lock_entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), FantabaseError> {
        self.lock_entries().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), FantabaseError> {
        self.lock_entries().remove(key);
        Ok(())
    }
}
