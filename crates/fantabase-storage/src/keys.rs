pub const SESSION_ID_KEY: &str = "fantabase_demo_guest_session_id";
pub const SLEEPER_USERNAME_KEY: &str = "fantabase_demo_sleeper_username";
pub const REMAINING_MESSAGES_KEY: &str = "fantabase_demo_remaining_messages";
pub const HISTORY_KEY_PREFIX: &str = "fantabase_demo_chat_history_v1";

/// History is namespaced per session so a fresh session never sees another's log.
pub fn history_key(session_id: &str) -> String {
    format!("{HISTORY_KEY_PREFIX}_{session_id}")
}
