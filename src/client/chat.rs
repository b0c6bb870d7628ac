use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};

use uuid::Uuid;

use crate::{
    error::ChatError,
    model::{Conversation, Identity, Message, NewMessage, is_blank},
    rooms::{Presence, ServerEvent, Topic},
    store::MessageStore,
};

use super::{
    thread::{ScrollAnchor, Thread, Viewport},
    unread::UnreadCounter,
};

const COUNTED_WINDOW: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// Added to the open thread. `follow` asks the UI to scroll to the end.
    Appended { follow: bool },
    Duplicate,
    Unread { peer_id: String, count: u32 },
    /// Not for this viewer, or the viewer's own message for a closed thread.
    Ignored,
    /// The socket dropped events. Call [`ChatSession::resync`] and refresh
    /// the notification feed.
    Resync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Prepended { added: usize },
    /// The page belonged to a thread that has since been closed or replaced.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Older {
    pub added: usize,
    pub anchor: ScrollAnchor,
}

/// A history request bound to the thread generation that issued it.
#[derive(Debug, Clone)]
pub struct HistoryTicket {
    generation: u64,
    conversation: Conversation,
    before: Option<Uuid>,
    limit: u32,
}

impl HistoryTicket {
    pub async fn fetch(self, store: &dyn MessageStore) -> HistoryPage {
        let result = store.history(&self.conversation, self.before, self.limit).await;
        HistoryPage {
            generation: self.generation,
            limit: self.limit,
            result,
        }
    }
}

#[derive(Debug)]
pub struct HistoryPage {
    generation: u64,
    limit: u32,
    result: Result<Vec<Message>, ChatError>,
}

/// Ids already counted as unread, bounded so a long session stays small.
#[derive(Debug, Default)]
struct CountedIds {
    order: VecDeque<Uuid>,
    ids: HashSet<Uuid>,
}

impl CountedIds {
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > COUNTED_WINDOW {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
        true
    }
}

/// Drives one viewer's chat: at most one open thread, plus unread counts for
/// every other peer.
pub struct ChatSession {
    identity: Identity,
    store: Arc<dyn MessageStore>,
    presence: Arc<dyn Presence>,
    page_size: u32,
    generation: u64,
    thread: Option<Thread>,
    unread: UnreadCounter,
    counted: CountedIds,
}

impl ChatSession {
    pub fn new(
        identity: Identity,
        store: Arc<dyn MessageStore>,
        presence: Arc<dyn Presence>,
        page_size: u32,
    ) -> Self {
        ChatSession {
            identity,
            store,
            presence,
            page_size: page_size.max(1),
            generation: 0,
            thread: None,
            unread: UnreadCounter::new(),
            counted: CountedIds::default(),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn thread(&self) -> Option<&Thread> {
        self.thread.as_ref()
    }

    pub fn unread(&self) -> &UnreadCounter {
        &self.unread
    }

    /// Subscribes to the viewer's own user room, where messages for closed
    /// threads and notifications arrive.
    pub async fn join_inbox(&self) -> Result<(), ChatError> {
        self.presence
            .join(Topic::User(self.identity.user_id.clone()))
            .await
    }

    pub async fn open_thread(&mut self, peer_id: &str) -> Result<(), ChatError> {
        self.close_thread().await?;

        let conversation = Conversation::resolve(&self.identity.user_id, peer_id, self.identity.role);
        self.presence.join(Topic::Room(conversation.clone())).await?;

        self.generation += 1;
        self.unread.reset(peer_id);
        self.thread = Some(Thread::new(peer_id, conversation, self.generation));
        tracing::debug!(peer_id, generation = self.generation, "thread opened");

        if let Some(ticket) = self.history_ticket() {
            let page = ticket.fetch(self.store.as_ref()).await;
            self.apply_history(page)?;
        }
        Ok(())
    }

    pub async fn close_thread(&mut self) -> Result<(), ChatError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.generation += 1;
        tracing::debug!(peer_id = thread.peer_id(), "thread closed");
        self.presence
            .leave(Topic::Room(thread.conversation().clone()))
            .await
    }

    pub fn history_ticket(&self) -> Option<HistoryTicket> {
        let thread = self.thread.as_ref().filter(|t| t.has_more())?;
        Some(HistoryTicket {
            generation: thread.generation(),
            conversation: thread.conversation().clone(),
            before: thread.oldest(),
            limit: self.page_size,
        })
    }

    /// Merges a fetched page, unless the thread it was fetched for is gone.
    pub fn apply_history(&mut self, page: HistoryPage) -> Result<Applied, ChatError> {
        let Some(thread) = self
            .thread
            .as_mut()
            .filter(|t| t.generation() == page.generation)
        else {
            tracing::debug!(generation = page.generation, "discarding stale history page");
            return Ok(Applied::Stale);
        };

        let messages = page.result?;
        let added = thread.prepend_page(messages, page.limit);
        Ok(Applied::Prepended { added })
    }

    /// Fetches the page before the oldest shown message. Restore the scroll
    /// position with `anchor.restore(new_content_height)` after rendering.
    pub async fn load_older(&mut self, viewport: Viewport) -> Result<Older, ChatError> {
        let anchor = viewport.anchor();
        let Some(ticket) = self.history_ticket() else {
            return Ok(Older { added: 0, anchor });
        };

        let page = ticket.fetch(self.store.as_ref()).await;
        let added = match self.apply_history(page)? {
            Applied::Prepended { added } => added,
            Applied::Stale => 0,
        };
        Ok(Older { added, anchor })
    }

    pub async fn send(&mut self, text: &str) -> Result<Message, ChatError> {
        if is_blank(text) {
            return Err(ChatError::EmptyMessage);
        }
        let Some(conversation) = self.thread.as_ref().map(|t| t.conversation().clone()) else {
            return Err(ChatError::NotFound("open thread".to_owned()));
        };

        let message = self
            .store
            .append(NewMessage::new(&conversation, self.identity.role, text))
            .await?;

        // Already durable; the peer will see it on its next history load.
        if let Err(err) = self.presence.publish(&message).await {
            tracing::warn!(id = %message.id, "broadcast failed after persisting: {err}");
        }

        if let Some(thread) = self.thread.as_mut() {
            if *thread.conversation() == conversation {
                thread.append(message.clone());
            }
        }
        Ok(message)
    }

    /// Refetches the newest page of the open thread and appends whatever
    /// the socket dropped. Returns how many messages were recovered.
    pub async fn resync(&mut self) -> Result<usize, ChatError> {
        let Some(thread) = self.thread.as_ref() else {
            return Ok(0);
        };
        let (conversation, generation) = (thread.conversation().clone(), thread.generation());
        let latest = self.store.history(&conversation, None, self.page_size).await?;

        let Some(thread) = self.thread.as_mut().filter(|t| t.generation() == generation) else {
            return Ok(0);
        };
        Ok(latest.into_iter().rev().map(|m| thread.append(m)).filter(|&added| added).count())
    }

    pub fn on_message(&mut self, message: Message, viewport: Viewport) -> Incoming {
        let conversation = message.conversation();
        if !conversation.includes(&self.identity.user_id, self.identity.role) {
            return Incoming::Ignored;
        }

        if let Some(thread) = self.thread.as_mut() {
            if *thread.conversation() == conversation {
                let follow = viewport.at_bottom();
                return if thread.append(message) {
                    Incoming::Appended { follow }
                } else {
                    Incoming::Duplicate
                };
            }
        }

        if message.sender == self.identity.role {
            return Incoming::Ignored;
        }
        if !self.counted.insert(message.id) {
            return Incoming::Duplicate;
        }

        let peer_id = conversation.peer_of(self.identity.role).to_owned();
        let count = self.unread.increment(&peer_id);
        Incoming::Unread { peer_id, count }
    }

    pub fn on_event(&mut self, event: ServerEvent, viewport: Viewport) -> Option<Incoming> {
        match event {
            ServerEvent::NewMessage(message) => Some(self.on_message(message, viewport)),
            ServerEvent::Resync { skipped } => {
                tracing::warn!(skipped, "socket lagged");
                Some(Incoming::Resync)
            }
            _ => None,
        }
    }
}
