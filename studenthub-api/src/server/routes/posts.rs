use crate::{
    notify::Notifier,
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        extract::{Json, Query, ValidJson},
        forms::{Upload, read_post_form, store_uploads},
    },
    storage::FileStore,
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
        post::{Post, PostMarker, PostRating, RateRequest, UpdatePost, Vote},
        user::UserSummary,
    },
    util::{Page, Pagination},
};
use studenthub_db::client::{DbClient, DbError};

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_posts)
        .typed_post(create_post)
        .typed_get(get_post)
        .typed_put(update_post)
        .typed_delete(delete_post)
        .typed_put(rate_post)
        .typed_get(get_likes)
        .typed_get(get_dislikes)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts", rejection(ServerError))]
struct PostsPath();

async fn get_posts(
    PostsPath(): PostsPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<Post>>> {
    Ok(Json(db.fetch_posts(pagination).await?))
}

async fn create_post(
    PostsPath(): PostsPath,
    State(db): State<Arc<DbClient>>,
    State(files): State<Arc<FileStore>>,
    user: AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Post>)> {
    let form = read_post_form(multipart?, "posts").await?;
    let uploads: Vec<&Upload> = form.image.iter().chain(&form.attachments).collect();
    let stored_urls: Vec<&str> = uploads.iter().map(|upload| upload.file.url.as_str()).collect();
    store_uploads(&files, &uploads).await?;

    let attachments = form
        .attachments
        .iter()
        .map(|upload| upload.file.clone())
        .collect::<Vec<_>>();
    let image = form.image.as_ref().map(|upload| &upload.file);

    match db.create_post(user.user_id(), &form.post, image, &attachments).await {
        Ok(post) => Ok((StatusCode::CREATED, Json(post))),
        Err(err) => {
            files.delete_files(stored_urls).await;
            Err(err.into())
        }
    }
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/post/{id}", rejection(ServerError))]
struct PostPath {
    id: Id<PostMarker>,
}

async fn get_post(
    PostPath { id }: PostPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
) -> Result<Json<Post>> {
    let post = db
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(post))
}

/// Loads the post and checks that `user` wrote it.
async fn own_post(
    db: &DbClient,
    user: &AuthenticatedUser,
    id: Id<PostMarker>,
    action: &'static str,
) -> Result<Post> {
    let post = db
        .fetch_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;
    user.ensure_is(post.author, action)?;

    Ok(post)
}

async fn update_post(
    PostPath { id }: PostPath,
    State(db): State<Arc<DbClient>>,
    user: AuthenticatedUser,
    ValidJson(update): ValidJson<UpdatePost>,
) -> Result<Json<Post>> {
    own_post(&db, &user, id, "Only the author can edit a post").await?;

    let post = db
        .update_post(id, &update)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;
    Ok(Json(post))
}

async fn delete_post(
    PostPath { id }: PostPath,
    State(db): State<Arc<DbClient>>,
    State(files): State<Arc<FileStore>>,
    user: AuthenticatedUser,
) -> Result<StatusCode> {
    own_post(&db, &user, id, "Only the author can delete a post").await?;

    let file_urls = db
        .delete_post(id)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;
    files.delete_files(file_urls).await;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/post/{id}/rate", rejection(ServerError))]
struct RatePath {
    id: Id<PostMarker>,
}

#[derive(Clone, PartialEq, Debug, Serialize)]
struct RateResponse {
    message: String,
    #[serde(flatten)]
    rating: PostRating,
}

async fn rate_post(
    RatePath { id }: RatePath,
    State(db): State<Arc<DbClient>>,
    State(notifier): State<Arc<Notifier>>,
    user: AuthenticatedUser,
    Json(request): Json<RateRequest>,
) -> Result<Json<RateResponse>> {
    let vote = request.vote().map_err(DbError::from)?;

    let outcome = db
        .rate_post(id, user.user_id(), vote)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;
    notifier.dispatch_all(&outcome.notice);

    Ok(Json(RateResponse {
        message: format!("Post {}", outcome.change.vote()),
        rating: outcome.rating,
    }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/post/{id}/likes", rejection(ServerError))]
struct LikesPath {
    id: Id<PostMarker>,
}

async fn get_likes(
    LikesPath { id }: LikesPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<UserSummary>>> {
    voters(&db, id, Vote::Like, pagination).await
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/post/{id}/dislikes", rejection(ServerError))]
struct DislikesPath {
    id: Id<PostMarker>,
}

async fn get_dislikes(
    DislikesPath { id }: DislikesPath,
    State(db): State<Arc<DbClient>>,
    _user: AuthenticatedUser,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Page<UserSummary>>> {
    voters(&db, id, Vote::Dislike, pagination).await
}

async fn voters(
    db: &DbClient,
    id: Id<PostMarker>,
    vote: Vote,
    pagination: Pagination,
) -> Result<Json<Page<UserSummary>>> {
    let voters = db
        .fetch_post_voters(id, vote, pagination)
        .await?
        .ok_or(ServerError::PostByIdNotFound(id))?;

    Ok(Json(voters))
}

#[cfg(test)]
mod tests {
    use crate::server::tests::{TestApp, json_request};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use serde_json::json;

    #[tokio::test]
    async fn conflicting_votes_are_rejected() {
        let app = TestApp::new().await;
        let token = app.access_token(1);

        let (status, body) = app
            .send(json_request(
                "PUT",
                "/post/5/rate",
                Some(&token),
                &json!({"like": true, "dislike": true}),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error_message"],
            "A post cannot be liked and disliked at the same time"
        );

        let (status, _) = app
            .send(json_request("PUT", "/post/5/rate", Some(&token), &json!({})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn post_form_needs_heading_and_text() {
        let app = TestApp::new().await;
        let token = app.access_token(1);

        let boundary = "studenthub-boundary";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"text\"\r\n\r\n\
             Exam on Friday\r\n\
             --{boundary}--\r\n"
        );
        let request = Request::builder()
            .method("POST")
            .uri("/posts")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();

        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["heading"].is_array());
        assert!(body["errors"].get("text").is_none());
    }

    #[tokio::test]
    async fn post_creation_needs_a_multipart_body() {
        let app = TestApp::new().await;
        let token = app.access_token(1);

        let (status, _) = app
            .send(json_request(
                "POST",
                "/posts",
                Some(&token),
                &json!({"heading": "Hi", "text": "there"}),
            ))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
