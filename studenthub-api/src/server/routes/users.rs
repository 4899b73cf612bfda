use crate::{
    notify::Notifier,
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        extract::{Json, Query, ValidJson},
        routes::upload_image,
    },
    storage::FileStore,
    tokens::TokenService,
};
use axum::{
    extract::{Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studenthub_common::{
    model::{
        Id,
        auth::PasswordDigest,
        file::File,
        follow::{FollowAction, FollowRequest},
        user::{UpdateUser, User, UserMarker, UserSummary},
    },
    util::{Page, Pagination},
};
use studenthub_db::{client::DbClient, files::ImageOwner};
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_users)
        .typed_get(get_user)
        .typed_put(update_user)
        .typed_delete(delete_user)
        .typed_put(upload_user_image)
        .typed_put(follow_user)
        .typed_get(get_followers)
        .typed_get(get_following)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/users", rejection(ServerError))]
struct UsersPath();

async fn get_users(
    UsersPath(): UsersPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<User>>> {
    let users = db.fetch_users(pagination).await?;
    Ok(Json(users))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/user/{id}", rejection(ServerError))]
struct UserPath {
    id: Id<UserMarker>,
}

async fn get_user(
    UserPath { id }: UserPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
) -> Result<Json<User>> {
    let user = db
        .fetch_user(id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    Ok(Json(user))
}

async fn update_user(
    UserPath { id }: UserPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    ValidJson(update): ValidJson<UpdateUser>,
) -> Result<Json<User>> {
    user.ensure_is(id, "You can only update your own account")?;

    let password = update
        .password
        .as_deref()
        .map(PasswordDigest::hash)
        .transpose()?;
    let updated = db
        .update_user(id, &update, password.as_ref())
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    info!(user_id = %id, "Updated user");
    Ok(Json(updated))
}

async fn delete_user(
    UserPath { id }: UserPath,
    State(db): State<Arc<DbClient>>,
    State(files): State<Arc<FileStore>>,
    State(tokens): State<Arc<TokenService>>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    user.ensure_is(id, "You can only delete your own account")?;

    let file_urls = db
        .delete_user(id)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;
    files.delete_files(file_urls).await;
    tokens.revoke(user.claims()).await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/user/{id}/image", rejection(ServerError))]
struct UserImagePath {
    id: Id<UserMarker>,
}

async fn upload_user_image(
    UserImagePath { id }: UserImagePath,
    State(db): State<Arc<DbClient>>,
    State(files): State<Arc<FileStore>>,
    user: AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<File>> {
    user.ensure_is(id, "You can only change your own profile image")?;

    let file = upload_image(&db, &files, ImageOwner::User(id), multipart?)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;
    Ok(Json(file))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/user/{id}/follow", rejection(ServerError))]
struct FollowPath {
    id: Id<UserMarker>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct FollowStatus {
    user_id: Id<UserMarker>,
    following: bool,
}

async fn follow_user(
    FollowPath { id }: FollowPath,
    State(db): State<Arc<DbClient>>,
    State(notifier): State<Arc<Notifier>>,
    user: AuthenticatedUser,
    Json(FollowRequest { action }): Json<FollowRequest>,
) -> Result<Json<FollowStatus>> {
    let outcome = db
        .apply_follow(user.user_id(), id, action)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;
    notifier.dispatch_all(&outcome.notice);

    Ok(Json(FollowStatus {
        user_id: id,
        following: outcome.action == FollowAction::Follow,
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/user/{id}/followers", rejection(ServerError))]
struct FollowersPath {
    id: Id<UserMarker>,
}

async fn get_followers(
    FollowersPath { id }: FollowersPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<UserSummary>>> {
    let followers = db
        .fetch_followers(id, pagination)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    Ok(Json(followers))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/user/{id}/following", rejection(ServerError))]
struct FollowingPath {
    id: Id<UserMarker>,
}

async fn get_following(
    FollowingPath { id }: FollowingPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<UserSummary>>> {
    let following = db
        .fetch_following(id, pagination)
        .await?
        .ok_or(ServerError::UserByIdNotFound(id))?;

    Ok(Json(following))
}

#[cfg(test)]
mod tests {
    use crate::server::tests::{TestApp, get_request, json_request};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn self_follow_is_rejected() {
        let app = TestApp::new().await;
        let token = app.access_token(7);

        let (status, body) = app
            .send(json_request(
                "PUT",
                "/user/7/follow",
                Some(&token),
                &json!({"action": "follow"}),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error_message"], "You cannot follow yourself");
    }

    #[tokio::test]
    async fn unknown_follow_action_is_rejected() {
        let app = TestApp::new().await;
        let token = app.access_token(7);

        let (status, _) = app
            .send(json_request(
                "PUT",
                "/user/8/follow",
                Some(&token),
                &json!({"action": "befriend"}),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn other_accounts_are_off_limits() {
        let app = TestApp::new().await;
        let token = app.access_token(7);

        let (status, _) = app
            .send(json_request("PUT", "/user/8", Some(&token), &json!({"name": "Taras"})))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let request = axum::http::Request::builder()
            .method("DELETE")
            .uri("/user/8")
            .header("authorization", format!("Bearer {token}"))
            .body(axum::body::Body::empty())
            .unwrap();
        let (status, _) = app.send(request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let app = TestApp::new().await;
        let token = app.access_token(7);

        let (status, body) = app
            .send(json_request("PUT", "/user/7", Some(&token), &json!({})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["body"].is_array());
    }

    #[tokio::test]
    async fn non_numeric_ids_are_not_found() {
        let app = TestApp::new().await;
        let token = app.access_token(7);

        let (status, _) = app.send(get_request("/user/abc", Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
