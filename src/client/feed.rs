use std::sync::Arc;

use uuid::Uuid;

use crate::{error::ChatError, model::Notification, rooms::ServerEvent, store::NotificationApi};

/// The viewer's notification list and the unread badge next to it.
///
/// Two paths move the badge: `notification:new` adds one and
/// `notification:count` overwrites. If events are dropped they can disagree
/// until the next count event or [`NotificationFeed::refresh`].
pub struct NotificationFeed {
    api: Arc<dyn NotificationApi>,
    page_size: u32,
    items: Vec<Notification>,
    unread: u64,
    exhausted: bool,
}

impl NotificationFeed {
    pub fn new(api: Arc<dyn NotificationApi>, page_size: u32) -> Self {
        NotificationFeed {
            api,
            page_size: page_size.max(1),
            items: Vec::new(),
            unread: 0,
            exhausted: false,
        }
    }

    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread(&self) -> u64 {
        self.unread
    }

    pub fn has_more(&self) -> bool {
        !self.exhausted
    }

    pub async fn refresh(&mut self) -> Result<(), ChatError> {
        let items = self.api.list(self.page_size, 0).await?;
        let unread = self.api.unread_count().await?;

        self.exhausted = items.len() < self.page_size as usize;
        self.items = items;
        self.unread = unread;
        Ok(())
    }

    /// Appends the next older page. Returns how many new items were added.
    pub async fn load_more(&mut self) -> Result<usize, ChatError> {
        if self.exhausted {
            return Ok(0);
        }
        let skip = u32::try_from(self.items.len()).unwrap_or(u32::MAX);
        let page = self.api.list(self.page_size, skip).await?;
        self.exhausted = page.len() < self.page_size as usize;

        let before = self.items.len();
        for item in page {
            if !self.contains(&item.id) {
                self.items.push(item);
            }
        }
        Ok(self.items.len() - before)
    }

    pub fn on_new(&mut self, notification: Notification) -> bool {
        if self.contains(&notification.id) {
            return false;
        }
        self.items.insert(0, notification);
        self.unread += 1;
        true
    }

    pub fn on_count(&mut self, count: u64) {
        self.unread = count;
    }

    pub fn on_event(&mut self, event: ServerEvent) -> bool {
        match event {
            ServerEvent::NotificationNew(notification) => {
                self.on_new(notification);
                true
            }
            ServerEvent::NotificationCount { count } => {
                self.on_count(count);
                true
            }
            _ => false,
        }
    }

    pub async fn mark_read(&mut self, id: Uuid) -> Result<(), ChatError> {
        self.api.mark_read(id).await?;

        match self.items.iter_mut().find(|n| n.id == id) {
            Some(item) if !item.is_read => {
                item.is_read = true;
                self.unread = self.unread.saturating_sub(1);
            }
            Some(_) => {}
            // Not held locally, so whether it was unread is unknown.
            None => self.unread = self.api.unread_count().await?,
        }
        Ok(())
    }

    pub async fn mark_all_read(&mut self) -> Result<(), ChatError> {
        self.api.mark_all_read().await?;
        for item in &mut self.items {
            item.is_read = true;
        }
        self.unread = 0;
        Ok(())
    }

    fn contains(&self, id: &Uuid) -> bool {
        self.items.iter().any(|n| &n.id == id)
    }
}
