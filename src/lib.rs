pub mod config;
pub mod web;
pub mod widget;

pub use fantabase_app::logging;
pub use fantabase_core::error;
pub use fantabase_core::text;
pub use fantabase_storage as storage;

#[cfg(test)]
pub mod test_support {
    use std::sync::{Mutex, MutexGuard, OnceLock};

    pub fn env_lock() -> MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("env lock poisoned")
    }
}
