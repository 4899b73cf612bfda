use crate::{
    notify::Notifier,
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        extract::{Json, Query, ValidJson},
        routes::upload_image,
    },
    storage::FileStore,
};
use axum::{
    extract::{Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;
use studenthub_common::{
    model::{
        Id,
        comment::{Comment, CommentFilter, CommentMarker, CreateComment, UpdateComment},
        file::File,
    },
    util::{Page, Pagination},
};
use studenthub_db::{client::DbClient, comments::CommentCreation, files::ImageOwner};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_comments)
        .typed_post(create_comment)
        .typed_get(get_comment)
        .typed_put(update_comment)
        .typed_delete(delete_comment)
        .typed_put(upload_comment_image)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/comments", rejection(ServerError))]
struct CommentsPath();

async fn get_comments(
    CommentsPath(): CommentsPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    Query(CommentFilter { post_id }): Query<CommentFilter>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<Comment>>> {
    let comments = db
        .fetch_comments(post_id, pagination)
        .await?
        .ok_or(ServerError::PostByIdNotFound(post_id))?;

    Ok(Json(comments))
}

async fn create_comment(
    CommentsPath(): CommentsPath,
    State(db): State<Arc<DbClient>>,
    State(notifier): State<Arc<Notifier>>,
    user: AuthenticatedUser,
    ValidJson(request): ValidJson<CreateComment>,
) -> Result<(StatusCode, Json<Comment>)> {
    match db.create_comment(user.user_id(), &request).await? {
        CommentCreation::Created { comment, notice } => {
            notifier.dispatch_all(&notice);
            Ok((StatusCode::CREATED, Json(comment)))
        }
        CommentCreation::MissingPost => Err(ServerError::PostByIdNotFound(request.post)),
        CommentCreation::MissingParent => Err(request.parent.map_or(
            ServerError::PostByIdNotFound(request.post),
            ServerError::CommentByIdNotFound,
        )),
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/comment/{id}", rejection(ServerError))]
struct CommentPath {
    id: Id<CommentMarker>,
}

async fn get_comment(
    CommentPath { id }: CommentPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
) -> Result<Json<Comment>> {
    let comment = db
        .fetch_comment(id)
        .await?
        .ok_or(ServerError::CommentByIdNotFound(id))?;

    Ok(Json(comment))
}

async fn own_comment(
    db: &DbClient,
    user: &AuthenticatedUser,
    id: Id<CommentMarker>,
    action: &'static str,
) -> Result<Comment> {
    let comment = db
        .fetch_comment(id)
        .await?
        .ok_or(ServerError::CommentByIdNotFound(id))?;
    user.ensure_is(comment.author, action)?;

    Ok(comment)
}

async fn update_comment(
    CommentPath { id }: CommentPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    ValidJson(update): ValidJson<UpdateComment>,
) -> Result<Json<Comment>> {
    own_comment(&db, &user, id, "Only the author can edit a comment").await?;

    let comment = db
        .update_comment(id, &update)
        .await?
        .ok_or(ServerError::CommentByIdNotFound(id))?;
    Ok(Json(comment))
}

async fn delete_comment(
    CommentPath { id }: CommentPath,
    State(db): State<Arc<DbClient>>,
    State(files): State<Arc<FileStore>>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    own_comment(&db, &user, id, "Only the author can delete a comment").await?;

    let file_urls = db
        .delete_comment(id)
        .await?
        .ok_or(ServerError::CommentByIdNotFound(id))?;
    files.delete_files(file_urls).await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/comment/{id}/image", rejection(ServerError))]
struct CommentImagePath {
    id: Id<CommentMarker>,
}

async fn upload_comment_image(
    CommentImagePath { id }: CommentImagePath,
    State(db): State<Arc<DbClient>>,
    State(files): State<Arc<FileStore>>,
    user: AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<File>> {
    own_comment(&db, &user, id, "Only the author can change a comment image").await?;

    let file = upload_image(&db, &files, ImageOwner::Comment(id), multipart?)
        .await?
        .ok_or(ServerError::CommentByIdNotFound(id))?;
    Ok(Json(file))
}

#[cfg(test)]
mod tests {
    use crate::server::tests::{TestApp, get_request, json_request};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn listing_needs_a_post() {
        let app = TestApp::new().await;
        let token = app.access_token(1);

        let (status, _) = app.send(get_request("/comments?page=2", Some(&token))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn comment_text_is_bounded() {
        let app = TestApp::new().await;
        let token = app.access_token(1);

        let (status, body) = app
            .send(json_request(
                "POST",
                "/comments",
                Some(&token),
                &json!({"text": "a".repeat(251), "post": 1}),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["text"].is_array());

        let (status, _) = app
            .send(json_request("PUT", "/comment/1", Some(&token), &json!({"text": ""})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
