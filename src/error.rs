use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

// Taken from https://github.com/tokio-rs/axum/blob/main/examples/anyhow-error-response/src/main.rs
#[derive(Debug)]
pub struct RunnerError {
    pub status: StatusCode,
    pub message: HttpErrorResponse,
}

/// JSON body of every error response. The captured streams are only present when the script ran.
#[derive(Debug, Serialize, PartialEq)]
pub struct HttpErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stdout: Option<String>,
}

impl HttpErrorResponse {
    pub(crate) fn with_streams(message: &str, stderr: String, stdout: String) -> Self {
        HttpErrorResponse {
            error: message.to_string(),
            stderr: Some(stderr),
            stdout: Some(stdout),
        }
    }
}

impl From<String> for HttpErrorResponse {
    fn from(message: String) -> Self {
        HttpErrorResponse {
            error: message,
            stderr: None,
            stdout: None,
        }
    }
}

impl From<&str> for HttpErrorResponse {
    fn from(message: &str) -> Self {
        HttpErrorResponse::from(message.to_string())
    }
}

impl IntoResponse for RunnerError {
    fn into_response(self) -> Response {
        let mut res = Json(self.message).into_response();
        *res.status_mut() = self.status;
        res
    }
}

impl<E> From<E> for RunnerError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        RunnerError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: HttpErrorResponse::from(format!("{:#}", err.into())),
        }
    }
}

pub type RunnerResult<T, E = RunnerError> = Result<T, E>;

#[macro_export]
macro_rules! bail_runner {
    ($error_message:expr) => {
        return Err($crate::error::RunnerError {
            status: ::axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            message: $crate::error::HttpErrorResponse::from($error_message),
        })
    };
    ($status_code:expr, $error_message:expr) => {
        return Err($crate::error::RunnerError {
            status: $status_code,
            message: $crate::error::HttpErrorResponse::from($error_message),
        })
    };
    ($status:expr, $fmt:expr $(, $arg:expr)*) => {
        return Err($crate::error::RunnerError {
            status: $status,
            message: $crate::error::HttpErrorResponse::from(format!($fmt $(, $arg)*)),
        })
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_fields_are_omitted_when_absent() {
        let body = serde_json::to_value(HttpErrorResponse::from("Invalid JSON")).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "Invalid JSON" }));
    }

    #[test]
    fn stream_fields_are_serialized_when_present() {
        let body = serde_json::to_value(HttpErrorResponse::with_streams(
            "failed",
            "boom".into(),
            "partial".into(),
        ))
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "error": "failed", "stderr": "boom", "stdout": "partial" })
        );
    }

    #[test]
    fn unexpected_errors_map_to_internal_server_error() {
        let err = RunnerError::from(anyhow::anyhow!("spawn failed"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, HttpErrorResponse::from("spawn failed"));
    }
}
