use crate::{
    server::{
        Result, ServerError, ServerRouter,
        auth::{AuthenticatedUser, RefreshToken},
        extract::{Json, ValidJson},
    },
    tokens::TokenService,
};
use axum::{extract::State, http::StatusCode};
use axum_extra::routing::{RouterExt, TypedPath};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use studenthub_common::model::{
    auth::{LoginRequest, PasswordDigest, TokenPair},
    user::{CreateUser, User},
};
use studenthub_db::client::DbClient;
use tracing::info;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(register)
        .typed_post(login)
        .typed_get(refresh)
        .typed_post(logout)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/register", rejection(ServerError))]
struct RegisterPath();

async fn register(
    RegisterPath(): RegisterPath,
    State(db): State<Arc<DbClient>>,
    ValidJson(user): ValidJson<CreateUser>,
) -> Result<(StatusCode, Json<User>)> {
    let password = PasswordDigest::hash(&user.password)?;
    let user = db.create_user(&user, &password).await?;

    Ok((StatusCode::CREATED, Json(user)))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/login", rejection(ServerError))]
struct LoginPath();

async fn login(
    LoginPath(): LoginPath,
    State(db): State<Arc<DbClient>>,
    State(tokens): State<Arc<TokenService>>,
    Json(login): Json<LoginRequest>,
) -> Result<Json<TokenPair>> {
    let credentials = db
        .fetch_credentials(&login.email)
        .await?
        .ok_or(ServerError::InvalidCredentials)?;

    if !credentials.password.verify(&login.password) {
        return Err(ServerError::InvalidCredentials);
    }

    let pair = tokens.issue_pair(credentials.user)?;
    info!(user_id = %credentials.user, "User logged in");
    Ok(Json(pair))
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct AccessToken {
    access_token: String,
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/token/refresh", rejection(ServerError))]
struct RefreshPath();

async fn refresh(
    RefreshPath(): RefreshPath,
    State(tokens): State<Arc<TokenService>>,
    refresh_token: RefreshToken,
) -> Result<Json<AccessToken>> {
    let access_token = tokens.issue_access(refresh_token.user_id())?;
    Ok(Json(AccessToken { access_token }))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/logout", rejection(ServerError))]
struct LogoutPath();

async fn logout(
    LogoutPath(): LogoutPath,
    State(tokens): State<Arc<TokenService>>,
    user: AuthenticatedUser,
) -> StatusCode {
    tokens.revoke(user.claims()).await;
    info!(user_id = %user.user_id(), "User logged out");
    StatusCode::NO_CONTENT
}
