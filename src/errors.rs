//! Error taxonomy and translation into JSON:API error documents.
//!
//! Every failure a handler can surface is a variant of [`Error`]. The
//! mapping to an HTTP status and an error document is a lookup table
//! ([`Error::status_code`] / [`Error::to_document`]); `IntoResponse` applies
//! it, logging internals at a severity matched to the class of failure and
//! never leaking them to the client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error as ThisError;

use crate::document::{Document, ErrorObject, MEDIA_TYPE};
use crate::response::JsonApiResponse;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Malformed request: unreadable body, bad query parameters, wrong
    /// content type.
    #[error("{detail}")]
    BadRequest { detail: String },

    /// The request document failed validation. Each entry carries its own
    /// detail and source pointer.
    #[error("request document failed validation")]
    Validation { errors: Vec<ErrorObject> },

    /// Requested resource does not exist.
    #[error("{detail}")]
    NotFound { detail: String },

    /// Handler not implemented, or method outside the resource's allowed set.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Invalid `page[...]` parameters.
    #[error("{detail}")]
    Pagination { detail: String },

    /// Generic internal service error.
    #[error("failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Error::BadRequest { detail: detail.into() }
    }

    /// 404 with the standard detail message.
    pub fn not_found() -> Self {
        Error::NotFound {
            detail: "Resource object not found.".to_string(),
        }
    }

    pub fn not_found_with(detail: impl Into<String>) -> Self {
        Error::NotFound { detail: detail.into() }
    }

    pub fn internal(operation: impl Into<String>) -> Self {
        Error::Internal {
            operation: operation.into(),
        }
    }

    /// 400 raised when a POST/PATCH request does not carry the JSON:API
    /// media type.
    pub fn unsupported_content_type() -> Self {
        Error::BadRequest {
            detail: format!("Incorrect or missing Content-Type header, expected `{MEDIA_TYPE}`."),
        }
    }

    /// 400 raised when the request body cannot be parsed as JSON.
    pub fn unreadable_body() -> Self {
        Error::BadRequest {
            detail: "Could not read request body as JSON.".to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Error::Pagination { .. } => StatusCode::BAD_REQUEST,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A user-safe error message, without internal implementation details.
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { detail } => detail.clone(),
            Error::Validation { .. } => "Request document failed validation.".to_string(),
            Error::NotFound { detail } => detail.clone(),
            Error::MethodNotAllowed => "Method not allowed.".to_string(),
            Error::Pagination { detail } => detail.clone(),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }

    /// The response this error renders to.
    pub fn to_response(&self) -> JsonApiResponse {
        JsonApiResponse::new(self.status_code(), Some(self.to_document()))
    }

    /// Translate into a JSON:API error document. Every error object carries
    /// the HTTP status as a string.
    pub fn to_document(&self) -> Document {
        let status = self.status_code().as_u16();
        let errors = match self {
            Error::Validation { errors } => errors
                .iter()
                .cloned()
                .map(|e| if e.status.is_none() { e.with_status(status) } else { e })
                .collect(),
            _ => vec![ErrorObject::detail(self.user_message()).with_status(status)],
        };
        Document::from_errors(errors)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal error while handling request: {:#}", self);
            }
            Error::Validation { errors } => {
                tracing::debug!("Request document failed validation: {errors:?}");
            }
            Error::BadRequest { .. } | Error::NotFound { .. } | Error::Pagination { .. } => {
                tracing::debug!("Client error: {}", self);
            }
            Error::MethodNotAllowed => {
                tracing::debug!("Method not allowed");
            }
        }

        self.to_response().into_response()
    }
}

/// Type alias for handler results.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_mapping() {
        assert_eq!(Error::bad_request("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(Error::not_found().status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::MethodNotAllowed.status_code(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            Error::Pagination { detail: "x".into() }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::internal("save").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            Error::Other(anyhow::anyhow!("db exploded")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_not_leaked() {
        let err = Error::Other(anyhow::anyhow!("connection refused to 10.0.0.3"));
        let doc = err.to_document();
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({ "errors": [{ "status": "500", "detail": "Internal server error" }] })
        );
    }

    #[test]
    fn not_found_default_detail() {
        let doc = Error::not_found().to_document();
        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({ "errors": [{ "status": "404", "detail": "Resource object not found." }] })
        );
    }

    #[test]
    fn validation_errors_keep_pointers_and_gain_status() {
        let err = Error::Validation {
            errors: vec![
                ErrorObject::detail("Invalid `type` specified").with_pointer("/data/type"),
                ErrorObject::detail("already tagged").with_status(422),
            ],
        };
        let doc = err.to_document();
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["errors"][0]["status"], "400");
        assert_eq!(value["errors"][0]["source"]["pointer"], "/data/type");
        assert_eq!(value["errors"][1]["status"], "422");
    }

    #[test]
    fn content_type_detail_names_the_media_type() {
        let Error::BadRequest { detail } = Error::unsupported_content_type() else {
            panic!("expected BadRequest");
        };
        assert_eq!(
            detail,
            "Incorrect or missing Content-Type header, expected `application/vnd.api+json`."
        );
    }
}
