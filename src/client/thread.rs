use std::collections::HashSet;

use uuid::Uuid;

use crate::model::{Conversation, Message};

/// Distance from the end, in pixels, that still counts as "at the bottom".
pub const BOTTOM_SLACK: f64 = 24.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub content_height: f64,
    pub scroll_offset: f64,
    pub viewport_height: f64,
}

impl Viewport {
    pub fn at_bottom(&self) -> bool {
        self.content_height - (self.scroll_offset + self.viewport_height) <= BOTTOM_SLACK
    }

    pub fn anchor(&self) -> ScrollAnchor {
        ScrollAnchor {
            content_height: self.content_height,
            scroll_offset: self.scroll_offset,
        }
    }
}

/// Pre-fetch geometry, used to keep the visible message still after
/// older ones are inserted above it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollAnchor {
    content_height: f64,
    scroll_offset: f64,
}

impl ScrollAnchor {
    pub fn restore(&self, content_height: f64) -> f64 {
        (self.scroll_offset + (content_height - self.content_height)).max(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct Thread {
    peer_id: String,
    conversation: Conversation,
    generation: u64,
    messages: Vec<Message>,
    seen: HashSet<Uuid>,
    exhausted: bool,
}

impl Thread {
    pub fn new(peer_id: impl Into<String>, conversation: Conversation, generation: u64) -> Self {
        Thread {
            peer_id: peer_id.into(),
            conversation,
            generation,
            messages: Vec::new(),
            seen: HashSet::new(),
            exhausted: false,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.seen.contains(id)
    }

    pub fn oldest(&self) -> Option<Uuid> {
        self.messages.first().map(|m| m.id)
    }

    pub fn has_more(&self) -> bool {
        !self.exhausted
    }

    /// Inserts a newest-first history page above what is held. A page
    /// shorter than `limit` means the start of the conversation was reached.
    pub fn prepend_page(&mut self, page: Vec<Message>, limit: u32) -> usize {
        if page.len() < limit as usize {
            self.exhausted = true;
        }

        let mut older: Vec<Message> = page
            .into_iter()
            .rev()
            .filter(|m| self.seen.insert(m.id))
            .collect();
        let added = older.len();
        older.append(&mut self.messages);
        self.messages = older;
        added
    }

    pub fn append(&mut self, message: Message) -> bool {
        if !self.seen.insert(message.id) {
            return false;
        }
        self.messages.push(message);
        true
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::model::Role;

    fn msg(content: &str) -> Message {
        Message {
            id: Uuid::now_v7(),
            teacher_id: "t1".into(),
            student_id: "s1".into(),
            sender: Role::Student,
            content: content.into(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn contents(thread: &Thread) -> Vec<&str> {
        thread.messages().iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn pages_render_oldest_first() {
        let (a, b, c, d) = (msg("a"), msg("b"), msg("c"), msg("d"));
        let mut thread = Thread::new("s1", Conversation::new("t1", "s1"), 1);

        assert_eq!(thread.prepend_page(vec![d.clone(), c.clone()], 2), 2);
        assert_eq!(thread.oldest(), Some(c.id));
        assert!(thread.has_more());

        assert_eq!(thread.prepend_page(vec![b, a], 2), 2);
        assert_eq!(contents(&thread), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn overlapping_pages_do_not_duplicate() {
        let (a, b, c) = (msg("a"), msg("b"), msg("c"));
        let mut thread = Thread::new("s1", Conversation::new("t1", "s1"), 1);
        thread.prepend_page(vec![c.clone(), b.clone()], 2);

        assert_eq!(thread.prepend_page(vec![b, a], 3), 1);
        assert_eq!(contents(&thread), vec!["a", "b", "c"]);
        assert!(!thread.has_more());
    }

    #[test]
    fn live_duplicates_are_dropped() {
        let m = msg("hello");
        let mut thread = Thread::new("s1", Conversation::new("t1", "s1"), 1);
        assert!(thread.append(m.clone()));
        assert!(!thread.append(m.clone()));
        assert_eq!(thread.prepend_page(vec![m], 10), 0);
        assert_eq!(thread.messages().len(), 1);
    }

    #[test]
    fn anchor_keeps_visible_content_in_place() {
        let before = Viewport {
            content_height: 1000.0,
            scroll_offset: 0.0,
            viewport_height: 400.0,
        };
        let anchor = before.anchor();
        assert_eq!(anchor.restore(1600.0), 600.0);
        assert_eq!(anchor.restore(1000.0), 0.0);
    }

    #[test]
    fn bottom_detection_allows_slack() {
        let at_end = Viewport {
            content_height: 1000.0,
            scroll_offset: 590.0,
            viewport_height: 400.0,
        };
        let scrolled_up = Viewport {
            scroll_offset: 200.0,
            ..at_end
        };
        assert!(at_end.at_bottom());
        assert!(!scrolled_up.at_bottom());
        assert!(Viewport::default().at_bottom());
    }
}
