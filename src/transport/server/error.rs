//! server error type with http status mapping

use std::net::SocketAddr;
use std::time::Duration;

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use crate::error::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    /// store or codec failure
    #[error("{0}")]
    Store(#[from] Error),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("internal error: {0}")]
    Internal(String),

    /// listener could not bind; fatal
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server failed: {0}")]
    Serve(#[source] std::io::Error),

    /// in-flight requests outlived the grace period; fatal
    #[error("shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

impl ServerError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ServerError::BadRequest(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Multipart(e) => e.status(),
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,

            ServerError::Store(Error::InvalidName(_) | Error::InvalidVersion(_) | Error::Json(_)) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::Store(Error::NotFound(_) | Error::EntryNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            ServerError::Store(Error::Conflict(_)) => StatusCode::CONFLICT,
            ServerError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,

            ServerError::Bind { .. } | ServerError::Serve(_) | ServerError::ShutdownTimeout(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ServerError::bad_request("x"), StatusCode::BAD_REQUEST),
            (Error::InvalidName("..".into()).into(), StatusCode::BAD_REQUEST),
            (Error::NotFound("p".into()).into(), StatusCode::NOT_FOUND),
            (Error::EntryNotFound("f".into()).into(), StatusCode::NOT_FOUND),
            (Error::Conflict("v".into()).into(), StatusCode::CONFLICT),
            (Error::LockContention.into(), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{}", err);
        }
    }
}
