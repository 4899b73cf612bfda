use crate::server::{
    Result, ServerError, ServerRouter,
    auth::AuthenticatedUser,
    extract::{Json, Query},
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use studenthub_common::{
    model::{
        Id,
        notification::{Notification, NotificationMarker, UpdateNotification},
    },
    util::{Page, Pagination},
};
use studenthub_db::client::DbClient;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_notifications)
        .typed_get(get_notification)
        .typed_put(update_notification)
        .typed_delete(delete_notification)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/notifications", rejection(ServerError))]
struct NotificationsPath();

async fn get_notifications(
    NotificationsPath(): NotificationsPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<Notification>>> {
    Ok(Json(db.fetch_notifications(user.user_id(), pagination).await?))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/notification/{id}", rejection(ServerError))]
struct NotificationPath {
    id: Id<NotificationMarker>,
}

async fn own_notification(
    db: &DbClient,
    user: &AuthenticatedUser,
    id: Id<NotificationMarker>,
) -> Result<Notification> {
    let notification = db
        .fetch_notification(id)
        .await?
        .ok_or(ServerError::NotificationByIdNotFound(id))?;
    user.ensure_is(notification.receiver, "This notification belongs to someone else")?;

    Ok(notification)
}

async fn get_notification(
    NotificationPath { id }: NotificationPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<Json<Notification>> {
    Ok(Json(own_notification(&db, &user, id).await?))
}

async fn update_notification(
    NotificationPath { id }: NotificationPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    Json(UpdateNotification { is_seen }): Json<UpdateNotification>,
) -> Result<Json<Notification>> {
    own_notification(&db, &user, id).await?;

    let notification = db
        .set_notification_seen(id, is_seen)
        .await?
        .ok_or(ServerError::NotificationByIdNotFound(id))?;
    Ok(Json(notification))
}

async fn delete_notification(
    NotificationPath { id }: NotificationPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    own_notification(&db, &user, id).await?;

    if db.delete_notification(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServerError::NotificationByIdNotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use crate::server::tests::{TestApp, get_request, json_request};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn seen_flag_is_required() {
        let app = TestApp::new().await;
        let token = app.access_token(1);

        let (status, _) = app
            .send(json_request("PUT", "/notification/3", Some(&token), &json!({})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn notifications_need_a_token() {
        let app = TestApp::new().await;
        let (status, _) = app.send(get_request("/notifications", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
