use lambda_http::{http::StatusCode, Body, Error, Response};
use serde::Serialize;
use thiserror::Error as ThisError;

/// Closed error taxonomy for every handler. The kind decides the HTTP
/// status; the message is the short human-readable string the admin
/// panel surfaces.
#[derive(Debug, ThisError)]
pub enum AppError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    StoreFailure(String),
    #[error("{0}")]
    DownstreamFailure(String),
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: &'static str,
    message: String,
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::NotFound(_) => "NotFound",
            AppError::StoreFailure(_) => "StoreFailure",
            AppError::DownstreamFailure(_) => "DownstreamFailure",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StoreFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DownstreamFailure(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn into_response(self) -> Result<Response<Body>, Error> {
        let body = ErrorResponse {
            error: self.kind(),
            message: self.to_string(),
        };
        json_response(self.status(), &body)
    }
}

/// Build a JSON response with the CORS headers every endpoint carries.
pub fn json_response<T: Serialize>(
    status: StatusCode,
    value: &T,
) -> Result<Response<Body>, Error> {
    Ok(Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(serde_json::to_string(value)?.into())
        .map_err(Box::new)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_map_to_4xx() {
        assert_eq!(
            AppError::InvalidInput("invalid decision".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("target user does not exist".into()).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn backend_errors_map_to_5xx() {
        assert_eq!(
            AppError::StoreFailure("could not query db".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::DownstreamFailure("cognito rejected the request".into()).status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn kind_and_message_are_both_preserved() {
        let err = AppError::NotFound("target points does not exist".to_string());
        assert_eq!(err.kind(), "NotFound");
        assert_eq!(err.to_string(), "target points does not exist");
    }
}
