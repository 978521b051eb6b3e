use axum::{
    Json,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use deck_media::{OptionsError, PackageError};

pub mod cleanup;
pub mod compress;
pub mod system;

pub type ApiResult<T> = Result<T, ApiError>;
pub type ApiJsonResult<T> = ApiResult<Json<T>>;

const INTERNAL_MESSAGE: &str = "Error compressing file";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    PayloadTooLarge(String),
    Unauthorized,
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::PayloadTooLarge(message) => (StatusCode::PAYLOAD_TOO_LARGE, message),
            ApiError::Unauthorized => return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response(),
            ApiError::Internal(e) => {
                log::error!("ApiError: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE.to_string())
            }
        };
        // Errors are shown on the form they came from.
        match crate::page::index(Some(&message)) {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                log::error!("Error rendering form: {:?}", e);
                (status, message).into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        if let Some(e) = err.downcast_ref::<OptionsError>() {
            return ApiError::BadRequest(e.to_string());
        }
        if let Some(e) = err.downcast_ref::<PackageError>() {
            return ApiError::BadRequest(e.to_string());
        }
        ApiError::Internal(err)
    }
}
