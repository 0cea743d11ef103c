use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use aws_smithy_types::error::display::DisplayErrorContext;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt::Display;
use thiserror::Error;
use tracing::{error, warn};

use crate::locator::LocatorError;

pub type AppResult<T> = Result<T, AppError>;

pub const UPSTREAM_FAILURE_MESSAGE: &str = "The server encountered an issue with AWS.";
pub const BAD_REQUEST_MESSAGE: &str = "The request could not be processed.";
pub const INTERNAL_FAILURE_MESSAGE: &str =
    "The server encountered an unexpected condition that prevented it from fulfilling your request.";

/// Failure reported by one of the external collaborators.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{code}: {message}")]
    Upstream {
        status: u16,
        code: String,
        message: String,
    },
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl ServiceError {
    /// Keeps the upstream status and error code when the SDK got an HTTP
    /// response back; anything else (timeouts, dispatch or build failures)
    /// is unexpected.
    pub fn from_sdk<E>(err: SdkError<E, HttpResponse>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
    {
        let status = err.raw_response().map(|raw| raw.status().as_u16());
        match status {
            Some(status) => {
                let code = err.code().unwrap_or("Unknown").to_string();
                let message = err
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string());
                Self::Upstream {
                    status,
                    code,
                    message,
                }
            }
            None => Self::Unexpected(anyhow::anyhow!("{}", DisplayErrorContext(&err))),
        }
    }

    pub fn unexpected<E: Display>(error: E) -> Self {
        Self::Unexpected(anyhow::anyhow!("{error}"))
    }
}

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: &'static str,
    error: String,
    code: Option<String>,
}

impl AppError {
    pub fn bad_request(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: BAD_REQUEST_MESSAGE,
            error: error.into(),
            code: None,
        }
    }

    pub fn internal<E: Display>(error: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: INTERNAL_FAILURE_MESSAGE,
            error: error.to_string(),
            code: None,
        }
    }

    pub fn upstream(status: u16, code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            message: UPSTREAM_FAILURE_MESSAGE,
            error: error.into(),
            code: Some(code.into()),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        if status.is_server_error() || self.code.is_some() {
            error!(
                status = status.as_u16(),
                code = self.code.as_deref().unwrap_or("-"),
                error = %self.error,
                "request failed"
            );
        } else {
            warn!(status = status.as_u16(), error = %self.error, "request rejected");
        }

        let body = Json(ErrorResponse {
            status_code: status.as_u16(),
            message: self.message,
            error: self.error,
            code: self.code,
        });
        (status, body).into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    #[serde(rename = "statusCode")]
    status_code: u16,
    message: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl From<ServiceError> for AppError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::Upstream {
                status,
                code,
                message,
            } => AppError::upstream(status, code, message),
            ServiceError::Unexpected(err) => AppError::internal(format!("{err:#}")),
        }
    }
}

impl From<LocatorError> for AppError {
    fn from(value: LocatorError) -> Self {
        AppError::bad_request(value.to_string())
    }
}

impl From<JsonRejection> for AppError {
    fn from(value: JsonRejection) -> Self {
        AppError::bad_request(value.body_text())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError::internal(format!("{value:#}"))
    }
}
