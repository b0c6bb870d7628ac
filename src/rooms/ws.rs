use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use sqlx::SqlitePool;

use crate::{
    AppState, Config,
    error::ChatError,
    model::{Identity, Message},
};

use super::{
    hub::{Connection, Hub, Topic},
    msg,
    wire::{ClientFrame, ServerEvent},
};

#[debug_handler(state = AppState)]
pub(crate) async fn room_ws(
    State(db_pool): State<SqlitePool>,
    State(hub): State<Arc<Hub>>,
    State(config): State<Arc<Config>>,
    identity: Identity,
    ws: WebSocketUpgrade,
) -> Response {
    let capacity = config.outbox_capacity;
    ws.on_upgrade(move |socket| handle_socket(socket, db_pool, hub, identity, capacity))
}

async fn handle_socket(
    socket: WebSocket,
    db_pool: SqlitePool,
    hub: Arc<Hub>,
    identity: Identity,
    capacity: usize,
) {
    let (mut sender, mut receiver) = socket.split();
    let (conn, mut outbox) = Connection::open(hub, capacity);
    tracing::info!(connection = %conn.id(), user_id = %identity.user_id, "socket opened");

    let mut outbox_task = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("unserializable event: {e}");
                    continue;
                }
            };
            if sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let Some(Ok(msg)) = incoming else {
                    break;
                };
                match msg {
                    WsMessage::Text(text) => {
                        if let Err(err) = handle_frame(&db_pool, &conn, &identity, text.as_str()).await {
                            tracing::warn!(connection = %conn.id(), "rejected frame: {err}");
                            let _ = conn.deliver(ServerEvent::Error { message: err.to_string() }).await;
                        }
                    }
                    WsMessage::Close(_) => break,
                    _ => {}
                }
            }
            _ = &mut outbox_task => break,
        }
    }

    outbox_task.abort();
    tracing::info!(connection = %conn.id(), user_id = %identity.user_id, "socket closed");
}

/// Applies one client frame. Room membership is checked against the
/// session identity before any subscription or relay happens, and only
/// messages already in the store are relayed, in their stored form.
pub(crate) async fn handle_frame(
    db_pool: &SqlitePool,
    conn: &Connection,
    identity: &Identity,
    raw: &str,
) -> Result<(), ChatError> {
    match serde_json::from_str::<ClientFrame>(raw)? {
        ClientFrame::JoinRoom(room) => {
            let conversation = room.conversation()?;
            identity.authorize(&conversation)?;
            conn.subscribe(Topic::Room(conversation));
        }
        ClientFrame::LeaveRoom(room) => {
            conn.unsubscribe(&Topic::Room(room.conversation()?));
        }
        ClientFrame::SendMessage(wire) => {
            let claimed = Message::try_from(wire)?;
            let Some(stored) = msg::fetch_msg(db_pool, claimed.id).await? else {
                return Err(ChatError::NotFound(format!("message {}", claimed.id)));
            };
            identity.authorize_sender(&stored.conversation(), stored.sender)?;
            if claimed.content != stored.content || claimed.conversation() != stored.conversation() {
                tracing::debug!(id = %stored.id, "frame disagrees with stored message, relaying stored copy");
            }
            conn.relay(&stored);
        }
        ClientFrame::JoinUserRoom { user_id } => {
            if user_id != identity.user_id {
                return Err(ChatError::forbidden(&identity.user_id, format!("user room {user_id}")));
            }
            conn.subscribe(Topic::User(user_id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::{
        db,
        model::{Conversation, NewMessage, Role},
    };

    async fn next(rx: &mut mpsc::Receiver<ServerEvent>) -> Option<ServerEvent> {
        tokio::time::timeout(Duration::from_millis(200), rx.recv())
            .await
            .ok()
            .flatten()
    }

    async fn stored(db_pool: &SqlitePool, sender: Role, content: &str) -> Message {
        msg::insert_msg(db_pool, NewMessage::new(&Conversation::new("t1", "s1"), sender, content))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn outsider_cannot_join_room() {
        let db_pool = db::memory().await.unwrap();
        let (conn, _rx) = Connection::open(Arc::new(Hub::new(8)), 8);
        let intruder = Identity::new("s2", Role::Student);

        let err = handle_frame(
            &db_pool,
            &conn,
            &intruder,
            r#"{"event":"join_room","data":{"teacherId":"t1","studentId":"s1"}}"#,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChatError::Forbidden { .. }));
        assert!(!conn.is_joined(&Topic::Room(Conversation::new("t1", "s1"))));
    }

    #[tokio::test]
    async fn cannot_join_someone_elses_user_room() {
        let db_pool = db::memory().await.unwrap();
        let (conn, _rx) = Connection::open(Arc::new(Hub::new(8)), 8);
        let identity = Identity::new("t1", Role::Teacher);

        let err = handle_frame(
            &db_pool,
            &conn,
            &identity,
            r#"{"event":"join_user_room","data":{"userId":"t2"}}"#,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ChatError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn legacy_send_frame_reaches_room_in_canonical_shape() {
        let db_pool = db::memory().await.unwrap();
        let hub = Arc::new(Hub::new(8));
        let (teacher_conn, mut teacher_rx) = Connection::open(hub.clone(), 8);
        let (student_conn, _student_rx) = Connection::open(hub, 8);
        let teacher = Identity::new("t1", Role::Teacher);
        let student = Identity::new("s1", Role::Student);

        handle_frame(
            &db_pool,
            &teacher_conn,
            &teacher,
            r#"{"event":"join_room","data":{"roomId":"t1_s1","teacher":"t1","student":"s1"}}"#,
        )
        .await
        .unwrap();

        let original = stored(&db_pool, Role::Student, "hello").await;
        let frame = format!(
            r#"{{"event":"send_message","data":{{"id":"{}","teacher":"t1","student":"s1","sender":"student","content":"hello","timestamp":"2026-03-01T10:00:00Z","roomId":"t1_s1"}}}}"#,
            original.id
        );
        handle_frame(&db_pool, &student_conn, &student, &frame).await.unwrap();

        let Some(ServerEvent::NewMessage(message)) = next(&mut teacher_rx).await else {
            panic!("teacher got nothing");
        };
        assert_eq!(message.id, original.id);
        assert_eq!(message.teacher_id, "t1");
        assert_eq!(message.content, "hello");

        let json = serde_json::to_value(ServerEvent::NewMessage(message)).unwrap();
        assert_eq!(json["data"]["studentId"], "s1");
        assert!(json["data"].get("student").is_none());
    }

    #[tokio::test]
    async fn relayed_content_is_the_stored_content() {
        let db_pool = db::memory().await.unwrap();
        let hub = Arc::new(Hub::new(8));
        let (teacher_conn, mut teacher_rx) = Connection::open(hub.clone(), 8);
        let (student_conn, _student_rx) = Connection::open(hub, 8);
        teacher_conn.subscribe(Topic::Room(Conversation::new("t1", "s1")));

        let original = stored(&db_pool, Role::Student, "what was saved").await;
        let frame = format!(
            r#"{{"event":"send_message","data":{{"id":"{}","teacherId":"t1","studentId":"s1","sender":"student","content":"something else","createdAt":"1999-01-01T00:00:00Z"}}}}"#,
            original.id
        );
        handle_frame(&db_pool, &student_conn, &Identity::new("s1", Role::Student), &frame)
            .await
            .unwrap();

        let Some(ServerEvent::NewMessage(message)) = next(&mut teacher_rx).await else {
            panic!("teacher got nothing");
        };
        assert_eq!(message.content, "what was saved");
        assert_ne!(message.created_at.year(), 1999);
    }

    #[tokio::test]
    async fn unpersisted_message_is_not_relayed() {
        let db_pool = db::memory().await.unwrap();
        let hub = Arc::new(Hub::new(8));
        let (teacher_conn, mut teacher_rx) = Connection::open(hub.clone(), 8);
        let (student_conn, _student_rx) = Connection::open(hub, 8);
        teacher_conn.subscribe(Topic::Room(Conversation::new("t1", "s1")));

        let frame = format!(
            r#"{{"event":"send_message","data":{{"id":"{}","teacherId":"t1","studentId":"s1","sender":"student","content":"never saved"}}}}"#,
            Uuid::now_v7()
        );
        let err = handle_frame(&db_pool, &student_conn, &Identity::new("s1", Role::Student), &frame)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::NotFound(_)));
        assert_eq!(next(&mut teacher_rx).await, None);
    }

    #[tokio::test]
    async fn cannot_relay_the_other_partys_message() {
        let db_pool = db::memory().await.unwrap();
        let (conn, _rx) = Connection::open(Arc::new(Hub::new(8)), 8);
        let teachers = stored(&db_pool, Role::Teacher, "from the teacher").await;

        let frame = format!(
            r#"{{"event":"send_message","data":{{"id":"{}","teacherId":"t1","studentId":"s1","sender":"teacher","content":"forged"}}}}"#,
            teachers.id
        );
        assert!(matches!(
            handle_frame(&db_pool, &conn, &Identity::new("s1", Role::Student), &frame).await,
            Err(ChatError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn garbage_is_malformed() {
        let db_pool = db::memory().await.unwrap();
        let (conn, _rx) = Connection::open(Arc::new(Hub::new(8)), 8);
        let identity = Identity::new("t1", Role::Teacher);
        assert!(matches!(
            handle_frame(&db_pool, &conn, &identity, "{not json").await,
            Err(ChatError::Malformed(_))
        ));
    }
}
