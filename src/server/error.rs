//! Server error types and response handling

use axum::{
    body::Body,
    http::{header, Response, StatusCode},
    response::IntoResponse,
};

use crate::form::{ClientDataError, FormError};
use crate::link::LinkError;
use crate::page::PageError;

/// Errors that end a request without a page response
#[derive(Debug)]
pub enum ServerError {
    /// The request carried data that cannot be decoded or was tampered with
    BadRequest(String),
    /// No page or component matches the request
    NotFound(String),
    Internal(String),
}

impl ServerError {
    /// Classify a failure from the request pipeline by its root causes
    pub fn from_pipeline(error: anyhow::Error) -> Self {
        for cause in error.chain() {
            if let Some(e) = cause.downcast_ref::<LinkError>() {
                return match e {
                    LinkError::UnknownPage { .. } => Self::NotFound(e.to_string()),
                    LinkError::InvalidEncoding { .. } => Self::BadRequest(e.to_string()),
                };
            }
            if let Some(e) = cause.downcast_ref::<PageError>() {
                match e {
                    PageError::UnknownPage { .. } | PageError::UnknownComponent { .. } => {
                        return Self::NotFound(e.to_string())
                    }
                    _ => break,
                }
            }
            if let Some(e) = cause.downcast_ref::<FormError>() {
                match e {
                    FormError::MissingFormData { .. }
                    | FormError::ClientData(_)
                    | FormError::UnknownComponent { .. } => return Self::BadRequest(e.to_string()),
                    _ => break,
                }
            }
            if cause.downcast_ref::<ClientDataError>().is_some() {
                return Self::BadRequest(cause.to_string());
            }
        }
        Self::Internal(format!("{:#}", error))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(msg) | Self::NotFound(msg) | Self::Internal(msg) => msg,
        }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.status(), self.message())
    }
}

impl std::error::Error for ServerError {}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response<Body> {
        let status = self.status();
        match &self {
            Self::Internal(msg) => tracing::error!("Request failed: {} - {}", status, msg),
            Self::BadRequest(msg) | Self::NotFound(msg) => {
                tracing::debug!("Request rejected: {} - {}", status, msg)
            }
        }

        let message = match self {
            Self::BadRequest(msg) | Self::NotFound(msg) | Self::Internal(msg) => msg,
        };
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(Body::from(message))
            .unwrap_or_else(|_| Response::new(Body::from("Internal error building error response")))
    }
}
