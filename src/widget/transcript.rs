use super::history::Role;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BubbleId(u64);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BubbleContent {
    /// Placeholder shown while a reply is pending.
    Waiting,
    Text(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bubble {
    pub id: BubbleId,
    pub role: Role,
    pub content: BubbleContent,
}

/// The message list as currently displayed (not the persisted history).
#[derive(Debug, Default)]
pub struct Transcript {
    bubbles: Vec<Bubble>,
    next_id: u64,
}

impl Transcript {
    pub fn push(&mut self, role: Role, content: BubbleContent) -> Bubble {
        let bubble = Bubble {
            id: BubbleId(self.next_id),
            role,
            content,
        };
        self.next_id += 1;
        self.bubbles.push(bubble.clone());
        bubble
    }

    pub fn set_text(&mut self, id: BubbleId, text: impl Into<String>) -> bool {
        match self.bubbles.iter_mut().find(|b| b.id == id) {
            Some(bubble) => {
                bubble.content = BubbleContent::Text(text.into());
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: BubbleId) -> bool {
        let before = self.bubbles.len();
        self.bubbles.retain(|b| b.id != id);
        self.bubbles.len() != before
    }

    pub fn get(&self, id: BubbleId) -> Option<&Bubble> {
        self.bubbles.iter().find(|b| b.id == id)
    }

    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    pub fn last(&self) -> Option<&Bubble> {
        self.bubbles.last()
    }

    pub fn len(&self) -> usize {
        self.bubbles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bubbles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_unique_ids() {
        let mut t = Transcript::default();
        let a = t.push(Role::User, BubbleContent::Text("a".into()));
        let b = t.push(Role::Assistant, BubbleContent::Waiting);
        assert_ne!(a.id, b.id);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_set_text_replaces_waiting() {
        let mut t = Transcript::default();
        let b = t.push(Role::Assistant, BubbleContent::Waiting);
        assert!(t.set_text(b.id, "done"));
        assert_eq!(
            t.get(b.id).map(|b| &b.content),
            Some(&BubbleContent::Text("done".into()))
        );
    }

    #[test]
    fn test_remove_drops_bubble_and_keeps_ids_unique() {
        let mut t = Transcript::default();
        let a = t.push(Role::User, BubbleContent::Text("a".into()));
        assert!(t.remove(a.id));
        assert!(!t.remove(a.id));
        assert!(t.is_empty());
        let b = t.push(Role::User, BubbleContent::Text("b".into()));
        assert_ne!(a.id, b.id);
    }
}
