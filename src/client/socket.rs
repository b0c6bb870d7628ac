use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_tungstenite::tungstenite::{
    Message as WsMessage,
    client::IntoClientRequest,
    http::{HeaderValue, header::COOKIE},
};

use crate::{
    error::ChatError,
    model::Message,
    rooms::{ClientFrame, Presence, RoomRef, ServerEvent, Topic, WireMessage},
};

/// [`Presence`] over the relay's `/ws` endpoint.
///
/// Frames are written by a background task in call order; incoming events are
/// decoded and handed out through the receiver returned by [`SocketPresence::connect`].
pub struct SocketPresence {
    frames: mpsc::Sender<ClientFrame>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl SocketPresence {
    pub async fn connect(
        url: &str,
        cookie: Option<&str>,
        capacity: usize,
    ) -> Result<(Self, mpsc::Receiver<ServerEvent>), ChatError> {
        let mut request = url.into_client_request()?;
        if let Some(cookie) = cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| ChatError::Malformed(format!("session cookie: {e}")))?;
            request.headers_mut().insert(COOKIE, value);
        }

        let (stream, _) = tokio_tungstenite::connect_async(request).await?;
        let (mut sink, mut source) = stream.split();
        let (frames_tx, mut frames_rx) = mpsc::channel::<ClientFrame>(capacity);
        let (events_tx, events_rx) = mpsc::channel::<ServerEvent>(capacity);

        let writer = tokio::spawn(async move {
            while let Some(frame) = frames_rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("unserializable frame: {e}");
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::text(text)).await {
                    tracing::warn!("socket write failed: {e}");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let reader = tokio::spawn(async move {
            while let Some(msg) = source.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => match serde_json::from_str::<ServerEvent>(text.as_str()) {
                        Ok(event) => {
                            if events_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!("undecodable event: {e}"),
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("socket read failed: {e}");
                        break;
                    }
                }
            }
        });

        tracing::info!(%url, "socket connected");
        Ok((
            SocketPresence {
                frames: frames_tx,
                writer,
                reader,
            },
            events_rx,
        ))
    }

    async fn send_frame(&self, frame: ClientFrame) -> Result<(), ChatError> {
        self.frames
            .send(frame)
            .await
            .map_err(|_| ChatError::transport("socket closed"))
    }
}

impl Drop for SocketPresence {
    fn drop(&mut self) {
        self.writer.abort();
        self.reader.abort();
    }
}

#[async_trait]
impl Presence for SocketPresence {
    async fn join(&self, topic: Topic) -> Result<(), ChatError> {
        let frame = match topic {
            Topic::Room(conversation) => ClientFrame::JoinRoom(RoomRef::of(&conversation)),
            Topic::User(user_id) => ClientFrame::JoinUserRoom { user_id },
        };
        self.send_frame(frame).await
    }

    async fn leave(&self, topic: Topic) -> Result<(), ChatError> {
        match topic {
            Topic::Room(conversation) => {
                self.send_frame(ClientFrame::LeaveRoom(RoomRef::of(&conversation)))
                    .await
            }
            // User rooms live as long as the socket.
            Topic::User(_) => Ok(()),
        }
    }

    async fn publish(&self, message: &Message) -> Result<(), ChatError> {
        self.send_frame(ClientFrame::SendMessage(WireMessage::from(message)))
            .await
    }
}
