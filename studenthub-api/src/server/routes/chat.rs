use crate::{
    realtime::{ChatHub, protocol::ServerEvent},
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        extract::{Json, Query, ValidJson},
    },
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use studenthub_common::{
    model::{
        Id,
        chat::{ChatHistory, Message, MessageMarker, SendMessage, UpdateMessage},
        user::UserMarker,
    },
    util::{Page, Pagination},
};
use studenthub_db::client::DbClient;
use tracing::debug;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(open_chat)
        .typed_post(send_message)
        .typed_get(get_messages)
        .typed_put(update_message)
        .typed_delete(delete_message)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/chat/{receiver_id}", rejection(ServerError))]
struct ChatPath {
    receiver_id: Id<UserMarker>,
}

async fn open_chat(
    ChatPath { receiver_id }: ChatPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Json<ChatHistory>> {
    let history = db
        .open_room(user.user_id(), receiver_id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(receiver_id))?;

    Ok(Json(history))
}

async fn send_message(
    ChatPath { receiver_id }: ChatPath,
    State(db): State<Arc<DbClient>>,
    State(hub): State<Arc<ChatHub>>,
    user: AuthenticatedUser,
    ValidJson(SendMessage { text }): ValidJson<SendMessage>,
) -> Result<(StatusCode, Json<Message>)> {
    let message = db
        .send_message(user.user_id(), receiver_id, &text, None)
        .await?
        .ok_or(ServerError::UserByIdNotFound(receiver_id))?;

    let delivered = hub.publish(message.room, ServerEvent::DisplayMessage(message.clone()));
    debug!(message_id = %message.id, room_id = %message.room, delivered, "Broadcast message");

    Ok((StatusCode::CREATED, Json(message)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/messages/{receiver_id}", rejection(ServerError))]
struct MessagesPath {
    receiver_id: Id<UserMarker>,
}

async fn get_messages(
    MessagesPath { receiver_id }: MessagesPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<Message>>> {
    let messages = db
        .fetch_messages(user.user_id(), receiver_id, pagination)
        .await?
        .ok_or(ServerError::UserByIdNotFound(receiver_id))?;

    Ok(Json(messages))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/message/{receiver_id}/{message_id}", rejection(ServerError))]
struct MessagePath {
    receiver_id: Id<UserMarker>,
    message_id: Id<MessageMarker>,
}

async fn update_message(
    MessagePath {
        receiver_id,
        message_id,
    }: MessagePath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    ValidJson(UpdateMessage { text }): ValidJson<UpdateMessage>,
) -> Result<Json<Message>> {
    let message = db
        .update_message(user.user_id(), receiver_id, message_id, &text)
        .await?
        .ok_or(ServerError::MessageByIdNotFound(message_id))?;

    Ok(Json(message))
}

async fn delete_message(
    MessagePath {
        receiver_id,
        message_id,
    }: MessagePath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    db.delete_message(user.user_id(), receiver_id, message_id)
        .await?
        .ok_or(ServerError::MessageByIdNotFound(message_id))?;

    Ok(StatusCode::NO_CONTENT)
}
