use std::{fmt, sync::Arc};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    error::ChatError,
    model::{Conversation, Message},
    rooms::wire::ServerEvent,
};

/// A pub/sub channel name. Chat rooms and per-user notification rooms share
/// one hub but never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Room(Conversation),
    User(String),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Topic::Room(conversation) => write!(f, "room:{}", conversation.room_id()),
            Topic::User(user_id) => write!(f, "user:{user_id}"),
        }
    }
}

#[async_trait]
pub trait Presence: Send + Sync {
    /// Subscribe to `topic`. Joining twice is a no-op.
    async fn join(&self, topic: Topic) -> Result<(), ChatError>;

    /// Unsubscribe from `topic`. Leaving a topic never joined is a no-op.
    async fn leave(&self, topic: Topic) -> Result<(), ChatError>;

    async fn publish(&self, message: &Message) -> Result<(), ChatError>;
}

struct Channel {
    tx: broadcast::Sender<ServerEvent>,
    members: usize,
}

/// Every live topic, each backed by its own broadcast channel. A channel
/// lives while at least one connection has joined it.
pub struct Hub {
    capacity: usize,
    topics: DashMap<Topic, Channel>,
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        Hub {
            capacity,
            topics: DashMap::new(),
        }
    }

    pub fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<ServerEvent> {
        let mut channel = self.topics.entry(topic.clone()).or_insert_with(|| Channel {
            tx: broadcast::channel(self.capacity).0,
            members: 0,
        });
        channel.members += 1;
        channel.tx.subscribe()
    }

    /// Undoes one [`Hub::subscribe`]; the last one out drops the channel.
    pub fn release(&self, topic: &Topic) {
        self.topics.remove_if_mut(topic, |_, channel| {
            channel.members = channel.members.saturating_sub(1);
            channel.members == 0
        });
    }

    pub fn publish(&self, topic: &Topic, event: ServerEvent) -> usize {
        let Some(tx) = self.topics.get(topic).map(|channel| channel.tx.clone()) else {
            return 0;
        };
        tx.send(event).unwrap_or(0)
    }

    pub fn subscribers(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map_or(0, |channel| channel.members)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

/// One participant's attachment to the [`Hub`]. Everything it receives, from
/// any joined topic, lands in a single outbox in per-topic publish order.
pub struct Connection {
    id: Uuid,
    hub: Arc<Hub>,
    outbox: mpsc::Sender<ServerEvent>,
    joined: DashMap<Topic, JoinHandle<()>>,
}

impl Connection {
    pub fn new(hub: Arc<Hub>, outbox: mpsc::Sender<ServerEvent>) -> Self {
        Connection {
            id: Uuid::now_v7(),
            hub,
            outbox,
            joined: DashMap::new(),
        }
    }

    pub fn open(hub: Arc<Hub>, capacity: usize) -> (Self, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Connection::new(hub, tx), rx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns `false` if the topic was already joined.
    pub fn subscribe(&self, topic: Topic) -> bool {
        match self.joined.entry(topic) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let topic = slot.key().clone();
                let rx = self.hub.subscribe(&topic);
                let task = tokio::spawn(forward(self.id, topic.clone(), rx, self.outbox.clone()));
                slot.insert(task);
                tracing::debug!(connection = %self.id, %topic, "joined");
                true
            }
        }
    }

    pub fn unsubscribe(&self, topic: &Topic) -> bool {
        let Some((_, task)) = self.joined.remove(topic) else {
            return false;
        };
        task.abort();
        self.hub.release(topic);
        tracing::debug!(connection = %self.id, %topic, "left");
        true
    }

    pub fn is_joined(&self, topic: &Topic) -> bool {
        self.joined.contains_key(topic)
    }

    /// Fans `message` out to its room, sender included, and to the
    /// recipient's user topic so a closed thread still learns about it.
    pub fn relay(&self, message: &Message) -> usize {
        let room = Topic::Room(message.conversation());
        let inbox = Topic::User(message.recipient_id().to_owned());

        let reached = self.hub.publish(&room, ServerEvent::NewMessage(message.clone()))
            + self.hub.publish(&inbox, ServerEvent::NewMessage(message.clone()));
        tracing::debug!(connection = %self.id, %room, id = %message.id, reached, "relayed");
        reached
    }

    pub async fn deliver(&self, event: ServerEvent) -> Result<(), ChatError> {
        self.outbox
            .send(event)
            .await
            .map_err(|_| ChatError::transport("connection outbox closed"))
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let topics: Vec<Topic> = self.joined.iter().map(|entry| entry.key().clone()).collect();
        for topic in topics {
            self.unsubscribe(&topic);
        }
    }
}

async fn forward(
    connection: Uuid,
    topic: Topic,
    mut rx: broadcast::Receiver<ServerEvent>,
    outbox: mpsc::Sender<ServerEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if outbox.send(event).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(%connection, %topic, skipped, "subscriber lagged, events dropped");
                if outbox.send(ServerEvent::Resync { skipped }).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[async_trait]
impl Presence for Connection {
    async fn join(&self, topic: Topic) -> Result<(), ChatError> {
        self.subscribe(topic);
        Ok(())
    }

    async fn leave(&self, topic: Topic) -> Result<(), ChatError> {
        self.unsubscribe(&topic);
        Ok(())
    }

    async fn publish(&self, message: &Message) -> Result<(), ChatError> {
        self.relay(message);
        Ok(())
    }
}
