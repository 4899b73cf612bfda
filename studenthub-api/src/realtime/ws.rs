//! The chat socket at `/chat/ws`.
//!
//! A socket starts out in no room. `join_room` subscribes it to a room the
//! user belongs to, `message` and `message_read` go through the store first
//! and are broadcast to the room afterwards. Every joined room gets its own
//! forwarding task feeding the socket's writer.

use crate::{
    realtime::{
        ChatHub,
        protocol::{ClientEvent, ServerEvent},
    },
    server::{Result, ServerError, ServerRouter, extract::Query},
    tokens::TokenService,
};
use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message as Frame, WebSocket, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
};
use axum_extra::routing::{RouterExt, TypedPath};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::{collections::HashMap, sync::Arc};
use studenthub_common::{
    model::{
        Id,
        auth::TokenKind,
        chat::{ChatError, MessageMarker, RoomMarker, SendMessage},
        user::UserMarker,
    },
    validate::Validate,
};
use studenthub_db::client::{DbClient, DbError};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};

const OUTBOX_CAPACITY: usize = 64;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_get(chat_socket)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/chat/ws", rejection(ServerError))]
struct ChatSocketPath();

#[derive(Deserialize)]
struct SocketQuery {
    #[serde(default)]
    access_token: Option<String>,
}

async fn chat_socket(
    ChatSocketPath(): ChatSocketPath,
    State(db): State<Arc<DbClient>>,
    State(hub): State<Arc<ChatHub>>,
    State(tokens): State<Arc<TokenService>>,
    Query(SocketQuery { access_token }): Query<SocketQuery>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response> {
    let access_token = access_token.ok_or(ServerError::MissingAccessToken)?;
    let claims = tokens.authenticate(&access_token, TokenKind::Access)?;

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let user_id = claims.sub;
    Ok(upgrade.on_upgrade(move |socket| async move {
        ChatSession::new(user_id, db, hub).run(socket).await;
    }))
}

struct ChatSession {
    user_id: Id<UserMarker>,
    db: Arc<DbClient>,
    hub: Arc<ChatHub>,
    rooms: HashMap<Id<RoomMarker>, JoinHandle<()>>,
}

impl ChatSession {
    fn new(user_id: Id<UserMarker>, db: Arc<DbClient>, hub: Arc<ChatHub>) -> Self {
        Self {
            user_id,
            db,
            hub,
            rooms: HashMap::new(),
        }
    }

    async fn run(mut self, socket: WebSocket) {
        info!(user_id = %self.user_id, "Chat socket connected");

        let (mut sink, mut stream) = socket.split();
        let (outbox, mut pending) = mpsc::channel::<ServerEvent>(OUTBOX_CAPACITY);

        let writer = tokio::spawn(async move {
            while let Some(event) = pending.recv().await {
                let text = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "Could not serialize chat event");
                        continue;
                    }
                };
                if sink.send(Frame::Text(text.into())).await.is_err() {
                    break;
                }
            }
        });

        while let Some(frame) = stream.next().await {
            let text = match frame {
                Ok(Frame::Text(text)) => text,
                Ok(Frame::Close(_)) => break,
                Ok(_) => continue,
                Err(err) => {
                    debug!(user_id = %self.user_id, error = %err, "Chat socket failed");
                    break;
                }
            };

            let reply = match serde_json::from_str::<ClientEvent>(text.as_str()) {
                Ok(event) => self.handle(event, &outbox).await,
                Err(err) => Some(ServerEvent::error(format!("Malformed event: {err}"))),
            };
            if let Some(reply) = reply
                && outbox.send(reply).await.is_err()
            {
                break;
            }
        }

        for (room_id, forwarder) in self.rooms.drain() {
            stop_forwarding(&self.hub, room_id, forwarder).await;
        }
        drop(outbox);
        writer.abort();

        info!(user_id = %self.user_id, "Chat socket disconnected");
    }

    /// Applies one client event. Returns what to tell this client directly.
    async fn handle(
        &mut self,
        event: ClientEvent,
        outbox: &mpsc::Sender<ServerEvent>,
    ) -> Option<ServerEvent> {
        let result = match event {
            ClientEvent::JoinRoom { room_id } => self.join(room_id, outbox).await.map(Some),
            ClientEvent::LeaveRoom { room_id } => Ok(Some(self.leave(room_id).await)),
            ClientEvent::Message {
                text,
                sender_id,
                receiver_id,
                room_id,
            } => self
                .send(text, sender_id, receiver_id, room_id)
                .await
                .map(|()| None),
            ClientEvent::MessageRead { message_id } => self.read(message_id).await.map(|()| None),
        };

        result.unwrap_or_else(|err| {
            debug!(user_id = %self.user_id, error = %err, "Rejected chat event");
            Some(ServerEvent::error(err.public_message()))
        })
    }

    async fn join(
        &mut self,
        room_id: Id<RoomMarker>,
        outbox: &mpsc::Sender<ServerEvent>,
    ) -> Result<ServerEvent> {
        let room = self
            .db
            .fetch_room(room_id)
            .await?
            .ok_or(ServerError::RoomByIdNotFound(room_id))?;
        if !room.members.contains(&self.user_id) {
            return Err(DbError::from(ChatError::NotMember).into());
        }

        let joined = self
            .rooms
            .get(&room_id)
            .is_some_and(|forwarder| !forwarder.is_finished());
        if !joined {
            let events = self.hub.subscribe(room_id);
            let forwarder = tokio::spawn(forward(room_id, events, outbox.clone()));
            // Any previous forwarder for this room has finished already.
            self.rooms.insert(room_id, forwarder);
            debug!(user_id = %self.user_id, %room_id, "Joined chat room");
        }

        Ok(ServerEvent::Joined { room_id })
    }

    async fn leave(&mut self, room_id: Id<RoomMarker>) -> ServerEvent {
        if let Some(forwarder) = self.rooms.remove(&room_id) {
            stop_forwarding(&self.hub, room_id, forwarder).await;
            debug!(user_id = %self.user_id, %room_id, "Left chat room");
        }

        ServerEvent::Left { room_id }
    }

    async fn send(
        &self,
        text: String,
        sender_id: Id<UserMarker>,
        receiver_id: Id<UserMarker>,
        room_id: Id<RoomMarker>,
    ) -> Result<()> {
        if sender_id != self.user_id {
            return Err(ServerError::Forbidden("You can only send messages as yourself"));
        }
        let request = SendMessage { text };
        request.validate()?;

        let message = self
            .db
            .send_message(sender_id, receiver_id, &request.text, Some(room_id))
            .await?
            .ok_or(ServerError::UserByIdNotFound(receiver_id))?;

        self.hub
            .publish(message.room, ServerEvent::DisplayMessage(message));
        Ok(())
    }

    async fn read(&self, message_id: Id<MessageMarker>) -> Result<()> {
        let message = self
            .db
            .mark_message_read(self.user_id, message_id)
            .await?
            .ok_or(ServerError::MessageByIdNotFound(message_id))?;

        self.hub.publish(
            message.room,
            ServerEvent::MessageRead {
                message_id,
                room_id: message.room,
                reader_id: self.user_id,
            },
        );
        Ok(())
    }
}

/// Cancels a room forwarder and drops the room's channel if it was the last listener.
///
/// The forwarder owns its receiver until the task has actually ended, so the
/// prune has to wait for that.
async fn stop_forwarding(hub: &ChatHub, room_id: Id<RoomMarker>, forwarder: JoinHandle<()>) {
    forwarder.abort();
    if let Err(err) = forwarder.await
        && !err.is_cancelled()
    {
        warn!(%room_id, error = %err, "Chat forwarder failed");
    }
    hub.prune(room_id);
}

/// Copies room events into the socket's outbox until either side goes away.
async fn forward(
    room_id: Id<RoomMarker>,
    mut events: broadcast::Receiver<ServerEvent>,
    outbox: mpsc::Sender<ServerEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if outbox.send(event).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(%room_id, skipped, "Chat subscriber fell behind, dropping it");
                // Best effort, the socket might be gone already.
                let _ = outbox
                    .send(ServerEvent::error(format!(
                        "Missed {skipped} events in room {room_id}, join again to resume"
                    )))
                    .await;
                break;
            }
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        realtime::{
            ChatHub,
            protocol::ServerEvent,
            ws::{forward, stop_forwarding},
        },
        server::tests::{TestApp, get_request},
    };
    use axum::http::StatusCode;
    use std::time::Duration;
    use studenthub_common::model::Id;
    use tokio::{sync::mpsc, time::timeout};

    #[tokio::test]
    async fn socket_needs_an_access_token() {
        let app = TestApp::new().await;

        let (status, _) = app.send(get_request("/chat/ws", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = app
            .send(get_request("/chat/ws?access_token=garbage", None))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let refresh = app.state.tokens.issue_pair(Id::new(1)).unwrap().refresh_token;
        let (status, _) = app
            .send(get_request(&format!("/chat/ws?access_token={refresh}"), None))
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn forwarder_relays_until_unsubscribed() {
        let hub = ChatHub::default();
        let (outbox, mut pending) = mpsc::channel(8);
        let forwarder = tokio::spawn(forward(Id::new(1), hub.subscribe(Id::new(1)), outbox));

        hub.publish(Id::new(1), ServerEvent::Joined { room_id: Id::new(1) });
        let event = timeout(Duration::from_secs(5), pending.recv()).await.unwrap();
        assert_eq!(event, Some(ServerEvent::Joined { room_id: Id::new(1) }));

        forwarder.abort();
        assert!(forwarder.await.unwrap_err().is_cancelled());
        hub.prune(Id::new(1));
        assert_eq!(hub.live_rooms(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn leaving_drops_idle_room_channels() {
        let hub = ChatHub::default();

        for room in 0..200 {
            let room_id = Id::new(room);
            let (outbox, _pending) = mpsc::channel(8);
            let forwarder = tokio::spawn(forward(room_id, hub.subscribe(room_id), outbox));
            stop_forwarding(&hub, room_id, forwarder).await;
        }

        assert_eq!(hub.live_rooms(), 0);
    }

    #[tokio::test]
    async fn lagging_forwarder_gives_up() {
        let hub = ChatHub::new(1);
        let (outbox, mut pending) = mpsc::channel(8);
        let events = hub.subscribe(Id::new(1));

        for n in 0..3 {
            hub.publish(Id::new(1), ServerEvent::error(format!("event {n}")));
        }
        timeout(Duration::from_secs(5), forward(Id::new(1), events, outbox))
            .await
            .unwrap();

        assert!(matches!(
            pending.recv().await,
            Some(ServerEvent::Error { message }) if message.starts_with("Missed 2 events")
        ));
    }
}
