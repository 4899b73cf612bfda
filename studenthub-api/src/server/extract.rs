use crate::server::ServerError;
use axum::{
    Json as AxumJson,
    extract::{FromRequest, FromRequestParts, Query as AxumQuery, Request},
    response::{IntoResponse, Response},
};
use axum_extra::TypedHeader;
use headers::ContentType;
use serde::{Serialize, de::DeserializeOwned};
use studenthub_common::validate::Validate;

#[derive(FromRequest, Debug, Clone, Copy, Default)]
#[from_request(via(AxumJson), rejection(ServerError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        match serde_json::to_vec(&self.0) {
            Ok(json) => (TypedHeader(ContentType::json()), json).into_response(),
            Err(err) => ServerError::JsonResponse(err).into_response(),
        }
    }
}

#[derive(FromRequestParts, Debug, Clone, Copy, Default)]
#[from_request(via(AxumQuery), rejection(ServerError))]
pub struct Query<T>(pub T);

/// A JSON body that has already passed its [`Validate`] checks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(request, state).await?;
        value.validate()?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use crate::server::tests::{TestApp, json_request};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let app = TestApp::new().await;
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/register")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap();

        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn validation_reports_every_field() {
        let app = TestApp::new().await;
        let request = json_request(
            "POST",
            "/register",
            None,
            &json!({
                "name": "",
                "surname": "Shevchenko",
                "email": "not-an-email",
                "password": "short",
                "card_id": "KB123",
                "enrolment_year": "2021-09-01",
                "role": 1,
                "university": 1,
            }),
        );

        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["errors"]["name"].is_array());
        assert!(body["errors"]["email"].is_array());
        assert!(body["errors"]["password"].is_array());
        assert!(body["errors"].get("surname").is_none());
    }
}
