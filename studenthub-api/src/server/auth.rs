use crate::{server::ServerError, tokens::TokenService};
use axum::{
    extract::{FromRef, FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use axum_extra::TypedHeader;
use headers::{Authorization, authorization::Bearer};
use std::sync::Arc;
use studenthub_common::model::{
    Id,
    auth::{Claims, TokenKind},
    user::UserMarker,
};

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

async fn bearer_claims<S>(parts: &mut Parts, state: &S, kind: TokenKind) -> Result<Claims, ServerError>
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    let header = AuthorizationHeader::from_request_parts(parts, state)
        .await
        .map_err(ServerError::InvalidAuthorizationHeader)?;

    let claims = Arc::<TokenService>::from_ref(state).authenticate(header.token(), kind)?;
    Ok(claims)
}

/// The user behind a valid access token.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthenticatedUser {
    claims: Claims,
}

impl AuthenticatedUser {
    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.claims.sub
    }

    #[must_use]
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Only lets the user act on their own account.
    pub fn ensure_is(&self, user_id: Id<UserMarker>, action: &'static str) -> Result<(), ServerError> {
        if self.user_id() == user_id {
            Ok(())
        } else {
            Err(ServerError::Forbidden(action))
        }
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts, state, TokenKind::Access).await?;
        Ok(Self { claims })
    }
}

/// A valid refresh token, presented as bearer token.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub struct RefreshToken {
    claims: Claims,
}

impl RefreshToken {
    #[must_use]
    pub fn user_id(&self) -> Id<UserMarker> {
        self.claims.sub
    }
}

impl<S> FromRequestParts<S> for RefreshToken
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = bearer_claims(parts, state, TokenKind::Refresh).await?;
        Ok(Self { claims })
    }
}

/// Lets a request through only with a valid access token.
pub async fn require_auth(user: AuthenticatedUser, request: Request, next: Next) -> Response {
    tracing::trace!(user_id = %user.user_id(), uri = %request.uri(), "Authenticated request");
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use crate::server::tests::{TestApp, get_request};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use studenthub_common::{
        model::{
            Id,
            auth::{JwtKeys, TokenKind},
        },
        util::PositiveDuration,
    };
    use time::{Duration, UtcDateTime};

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let app = TestApp::new().await;
        let (status, body) = app.send(get_request("/users", None)).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["status"], 401);
    }

    #[tokio::test]
    async fn malformed_token_is_unauthorized() {
        let app = TestApp::new().await;
        let (status, _) = app.send(get_request("/users", Some("garbage"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = Request::builder()
            .uri("/users")
            .header(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")
            .body(Body::empty())
            .unwrap();
        let (status, _) = app.send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expired_token_is_not_acceptable() {
        let app = TestApp::new().await;
        let (token, _) = JwtKeys::from_secret(crate::tokens::tests::SECRET)
            .issue_at(
                Id::new(1),
                TokenKind::Access,
                PositiveDuration::new_unchecked(Duration::minutes(1)),
                UtcDateTime::now() - Duration::hours(1),
            )
            .unwrap();

        let (status, body) = app.send(get_request("/users", Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_ACCEPTABLE);
        assert_eq!(body["status"], 406);
    }

    #[tokio::test]
    async fn refresh_token_is_not_an_access_token() {
        let app = TestApp::new().await;
        let pair = app.state.tokens.issue_pair(Id::new(1)).unwrap();

        let (status, _) = app.send(get_request("/users", Some(&pair.refresh_token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
