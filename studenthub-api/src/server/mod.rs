use crate::{
    notify::Notifier,
    realtime::{self, ChatHub},
    storage::{FileStore, StorageError},
    tokens::{AuthError, TokenService},
};
use axum::{
    Router,
    extract::{
        DefaultBodyLimit, FromRef, Request,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::{StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use extract::Json;
use serde::Serialize;
use std::sync::Arc;
use studenthub_common::{
    model::{
        Id,
        auth::{PasswordError, TokenError},
        chat::{MessageMarker, RoomMarker},
        comment::CommentMarker,
        follow::FollowError,
        notification::NotificationMarker,
        post::{PostMarker, VoteError},
        university::{FacultyMarker, RoleMarker, UniversityMarker},
        user::UserMarker,
    },
    validate::FieldErrors,
};
use studenthub_db::client::{DbClient, DbError};
use thiserror::Error;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::error;

pub mod auth;
pub mod extract;
mod forms;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, Debug, FromRef)]
pub struct ServerState {
    pub db_client: Arc<DbClient>,
    pub tokens: Arc<TokenService>,
    pub notifier: Arc<Notifier>,
    pub hub: Arc<ChatHub>,
    pub files: Arc<FileStore>,
}

pub fn routes() -> ServerRouter {
    routes::routes()
        .merge(realtime::ws::routes())
        .fallback(fallback)
}

/// The whole application, ready to be served.
pub fn app(state: ServerState, max_upload_bytes: usize) -> Router {
    let media = ServerRouter::new()
        .nest_service("/media", ServeDir::new(state.files.root()))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    routes()
        .merge(media)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("Query string rejected: {0}")]
    QueryRejection(#[from] QueryRejection),
    #[error("Multipart body rejected: {0}")]
    MultipartRejection(#[from] MultipartRejection),
    #[error("Multipart body could not be read: {0}")]
    Multipart(#[from] MultipartError),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("The access_token query parameter is required")]
    MissingAccessToken,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Token could not be issued: {0}")]
    TokenIssue(#[from] TokenError),
    #[error("Email or password is incorrect")]
    InvalidCredentials,
    #[error(transparent)]
    Password(#[from] PasswordError),
    #[error(transparent)]
    Validation(#[from] FieldErrors),
    #[error("{0}")]
    Forbidden(&'static str),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("User with id {0} was not found.")]
    UserByIdNotFound(Id<UserMarker>),
    #[error("Role with id {0} was not found.")]
    RoleByIdNotFound(Id<RoleMarker>),
    #[error("University with id {0} was not found.")]
    UniversityByIdNotFound(Id<UniversityMarker>),
    #[error("Faculty with id {0} was not found.")]
    FacultyByIdNotFound(Id<FacultyMarker>),
    #[error("Post with id {0} was not found.")]
    PostByIdNotFound(Id<PostMarker>),
    #[error("Comment with id {0} was not found.")]
    CommentByIdNotFound(Id<CommentMarker>),
    #[error("Notification with id {0} was not found.")]
    NotificationByIdNotFound(Id<NotificationMarker>),
    #[error("Chat room with id {0} was not found.")]
    RoomByIdNotFound(Id<RoomMarker>),
    #[error("Message with id {0} was not found.")]
    MessageByIdNotFound(Id<MessageMarker>),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_)
            | ServerError::PathRejection(_)
            | ServerError::UserByIdNotFound(_)
            | ServerError::RoleByIdNotFound(_)
            | ServerError::UniversityByIdNotFound(_)
            | ServerError::FacultyByIdNotFound(_)
            | ServerError::PostByIdNotFound(_)
            | ServerError::CommentByIdNotFound(_)
            | ServerError::NotificationByIdNotFound(_)
            | ServerError::RoomByIdNotFound(_)
            | ServerError::MessageByIdNotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Auth(AuthError::Token(TokenError::Expired)) => StatusCode::NOT_ACCEPTABLE,
            ServerError::Auth(AuthError::Token(TokenError::Encode(_))) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::InvalidAuthorizationHeader(_)
            | ServerError::MissingAccessToken
            | ServerError::Auth(_)
            | ServerError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            ServerError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServerError::JsonRejection(_)
            | ServerError::QueryRejection(_)
            | ServerError::MultipartRejection(_)
            | ServerError::Multipart(_)
            | ServerError::Validation(_)
            | ServerError::Storage(StorageError::InvalidPath(_)) => StatusCode::BAD_REQUEST,
            ServerError::Database(err) => database_status(err),
            ServerError::JsonResponse(_)
            | ServerError::TokenIssue(_)
            | ServerError::Password(_)
            | ServerError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// What the client gets to read. Internal failures stay in the log.
    #[must_use]
    pub fn public_message(&self) -> String {
        if self.status().is_server_error() {
            "Internal server error".to_owned()
        } else {
            self.to_string()
        }
    }
}

fn database_status(err: &DbError) -> StatusCode {
    match err {
        DbError::Vote(VoteError::Inconsistent) | DbError::Follow(FollowError::Inconsistent { .. }) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        DbError::Conflict { .. }
        | DbError::MissingReference { .. }
        | DbError::Vote(_)
        | DbError::Follow(_)
        | DbError::Comment(_) => StatusCode::BAD_REQUEST,
        DbError::Chat(_) => StatusCode::FORBIDDEN,
        DbError::Data(_) | DbError::Migrate(_) | DbError::Sqlx(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    error_message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<FieldErrors>,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let error_response = ErrorResponse {
            status: status.as_u16(),
            error_message: self.public_message(),
            errors: match self {
                ServerError::Validation(errors) => Some(errors),
                _ => None,
            },
        };
        (status, Json(error_response)).into_response()
    }
}
