use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use fantabase_core::text::trimmed_non_empty;
use fantabase_storage::keys::history_key;
use fantabase_storage::store::{read_lenient, write_lenient};
use fantabase_storage::KeyValueStore;

use super::session::SessionId;
use super::transcript::{Bubble, BubbleContent, Transcript};

pub const HISTORY_LIMIT: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
}

impl ChatMessage {
    /// Accept only entries with a known role and non-blank text; anything
    /// else found in storage is dropped.
    fn from_value(value: &Value) -> Option<Self> {
        let role = Role::parse(value.get("role")?.as_str()?)?;
        let text = value.get("text")?.as_str()?;
        if text.trim().is_empty() {
            return None;
        }
        Some(ChatMessage {
            role,
            text: text.to_string(),
        })
    }
}

fn keep_last(mut messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    if messages.len() > HISTORY_LIMIT {
        messages.drain(..messages.len() - HISTORY_LIMIT);
    }
    messages
}

/// Per-session chat log kept in the key-value store as a JSON array.
#[derive(Clone)]
pub struct ChatHistory {
    store: Arc<dyn KeyValueStore>,
}

impl ChatHistory {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn read(&self, session_id: &SessionId) -> Vec<ChatMessage> {
        let Some(raw) = read_lenient(self.store.as_ref(), &history_key(session_id.as_str()))
        else {
            return Vec::new();
        };
        let entries = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(entries)) => entries,
            Ok(_) => return Vec::new(),
            Err(e) => {
                debug!("discarding corrupt chat history: {}", e);
                return Vec::new();
            }
        };
        keep_last(entries.iter().filter_map(ChatMessage::from_value).collect())
    }

    fn write(&self, session_id: &SessionId, messages: Vec<ChatMessage>) {
        let messages = keep_last(messages);
        match serde_json::to_string(&messages) {
            Ok(json) => write_lenient(
                self.store.as_ref(),
                &history_key(session_id.as_str()),
                &json,
            ),
            Err(e) => debug!("failed to serialize chat history: {}", e),
        }
    }

    /// Append a message. Blank text is ignored; stored text is trimmed.
    pub fn append(&self, session_id: &SessionId, role: Role, text: &str) {
        let Some(text) = trimmed_non_empty(text) else {
            return;
        };
        let mut messages = self.read(session_id);
        messages.push(ChatMessage { role, text });
        self.write(session_id, messages);
    }

    pub fn clear(&self, session_id: &SessionId) {
        self.write(session_id, Vec::new());
    }

    /// Fill an empty display with the stored history. A display that already
    /// shows anything is left untouched, so calling this twice never
    /// duplicates entries. Returns the bubbles that were added.
    pub fn render_into(&self, session_id: &SessionId, display: &mut Transcript) -> Vec<Bubble> {
        if !display.is_empty() {
            return Vec::new();
        }
        self.read(session_id)
            .into_iter()
            .map(|m| display.push(m.role, BubbleContent::Text(m.text)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fantabase_storage::MemoryStore;

    fn setup() -> (ChatHistory, Arc<MemoryStore>, SessionId) {
        let store = Arc::new(MemoryStore::new());
        (
            ChatHistory::new(store.clone()),
            store,
            SessionId::from("session-1"),
        )
    }

    #[test]
    fn test_read_empty_when_absent() {
        let (history, _store, sid) = setup();
        assert!(history.read(&sid).is_empty());
    }

    #[test]
    fn test_append_then_read_preserves_order_and_trims() {
        let (history, _store, sid) = setup();
        history.append(&sid, Role::User, "  hello ");
        history.append(&sid, Role::Assistant, "hi there");
        history.append(&sid, Role::User, "   ");
        let messages = history.read(&sid);
        assert_eq!(
            messages,
            vec![
                ChatMessage {
                    role: Role::User,
                    text: "hello".into()
                },
                ChatMessage {
                    role: Role::Assistant,
                    text: "hi there".into()
                },
            ]
        );
    }

    #[test]
    fn test_history_caps_at_limit_keeping_newest() {
        let (history, _store, sid) = setup();
        for i in 0..(HISTORY_LIMIT + 5) {
            history.append(&sid, Role::User, &format!("m{i}"));
        }
        let messages = history.read(&sid);
        assert_eq!(messages.len(), HISTORY_LIMIT);
        assert_eq!(messages[0].text, "m5");
        assert_eq!(
            messages.last().map(|m| m.text.as_str()),
            Some(format!("m{}", HISTORY_LIMIT + 4).as_str())
        );
    }

    #[test]
    fn test_corrupt_json_reads_as_empty() {
        let (history, store, sid) = setup();
        store.set(&history_key(sid.as_str()), "{not json").unwrap();
        assert!(history.read(&sid).is_empty());
        store.set(&history_key(sid.as_str()), r#"{"role":"user"}"#).unwrap();
        assert!(history.read(&sid).is_empty());
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let (history, store, sid) = setup();
        let raw = r#"[
            {"role":"user","text":"ok"},
            {"role":"system","text":"bad role"},
            {"role":"assistant","text":"   "},
            {"role":"assistant","text":42},
            null,
            "string",
            {"role":"assistant","text":"fine"}
        ]"#;
        store.set(&history_key(sid.as_str()), raw).unwrap();
        let texts: Vec<String> = history.read(&sid).into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["ok".to_string(), "fine".to_string()]);
    }

    #[test]
    fn test_history_is_scoped_per_session() {
        let (history, _store, sid) = setup();
        history.append(&sid, Role::User, "mine");
        assert!(history.read(&SessionId::from("other")).is_empty());
    }

    #[test]
    fn test_render_into_only_fills_empty_display() {
        let (history, _store, sid) = setup();
        history.append(&sid, Role::User, "a");
        history.append(&sid, Role::Assistant, "b");

        let mut display = Transcript::default();
        let added = history.render_into(&sid, &mut display);
        assert_eq!(added.len(), 2);
        assert_eq!(display.len(), 2);

        let again = history.render_into(&sid, &mut display);
        assert!(again.is_empty());
        assert_eq!(display.len(), 2);
    }
}
