//! Response wrapper that speaks the JSON:API media type.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::document::{Document, MEDIA_TYPE};

/// An HTTP response carrying an optional [`Document`], serialized with
/// `Content-Type: application/vnd.api+json`. A `None` document produces an
/// empty body (204 responses).
#[derive(Debug, Clone)]
pub struct JsonApiResponse {
    status: StatusCode,
    document: Option<Document>,
}

impl JsonApiResponse {
    pub fn new(status: StatusCode, document: Option<Document>) -> Self {
        Self { status, document }
    }

    /// 200 with the given document.
    pub fn ok(document: Document) -> Self {
        Self::new(StatusCode::OK, Some(document))
    }

    /// 201 with the given document.
    pub fn created(document: Document) -> Self {
        Self::new(StatusCode::CREATED, Some(document))
    }

    /// 204 with an empty body.
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT, None)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Mutable access to the document, e.g. for after-request hooks that
    /// stamp response metadata.
    pub fn document_mut(&mut self) -> Option<&mut Document> {
        self.document.as_mut()
    }
}

impl IntoResponse for JsonApiResponse {
    fn into_response(self) -> Response {
        let body = match &self.document {
            None => Vec::new(),
            Some(document) => match serde_json::to_vec(document) {
                Ok(body) => body,
                Err(e) => {
                    tracing::error!("Failed to serialize response document: {e}");
                    return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                }
            },
        };
        (self.status, [(header::CONTENT_TYPE, MEDIA_TYPE)], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, ResourceObject};

    #[test]
    fn sets_the_jsonapi_media_type() {
        let response = JsonApiResponse::ok(Document::one(ResourceObject::new("articles", Some("1".into())))).into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/vnd.api+json"
        );
    }

    #[test]
    fn no_content_has_empty_body() {
        let response = JsonApiResponse::no_content();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.document().is_none());
    }
}
