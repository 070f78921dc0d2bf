//! Request handlers

pub mod entities;
pub mod query;

use crate::error::{ApiError, Result};
use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use occigate_core::{MediaType, RequestBody, negotiate, render};
use serde::Deserialize;

/// Headers that carry the OCCI text rendering outside the body
const OCCI_HEADERS: [&str; 4] = ["category", "x-occi-attribute", "x-occi-location", "link"];

/// `?action=<term>` on a collection or instance
#[derive(Debug, Default, Deserialize)]
pub struct ActionQuery {
    pub action: Option<String>,
}

/// Media type to answer with
pub(crate) fn response_media(headers: &HeaderMap) -> Result<MediaType> {
    let accept = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok());
    Ok(negotiate(accept)?)
}

/// Decode the request body
///
/// An empty body falls back to OCCI fields sent as HTTP headers.
pub(crate) fn request_body(headers: &HeaderMap, body: &Bytes) -> Result<RequestBody> {
    let text = std::str::from_utf8(body)
        .map_err(|e| ApiError::BadRequest(format!("body is not UTF-8: {}", e)))?;
    if text.trim().is_empty() {
        let lines = header_lines(headers);
        if lines.is_empty() {
            return Ok(RequestBody::default());
        }
        return Ok(render::parse(&lines, MediaType::TextPlain)?);
    }

    let content_type = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let media = MediaType::from_content_type(content_type)?;
    Ok(render::parse(text, media)?)
}

fn header_lines(headers: &HeaderMap) -> String {
    let mut lines = String::new();
    for name in OCCI_HEADERS {
        for value in headers.get_all(name) {
            if let Ok(value) = value.to_str() {
                lines.push_str(name);
                lines.push_str(": ");
                lines.push_str(value);
                lines.push('\n');
            }
        }
    }
    lines
}

/// A rendered body with its content type
pub(crate) fn respond(status: StatusCode, media: MediaType, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, media.as_str())], body).into_response()
}

/// 201 with a `Location` header and the link-only body
pub(crate) fn created(media: MediaType, uri: &str, body: String) -> Response {
    let mut response = respond(StatusCode::CREATED, media, body);
    if let Ok(location) = HeaderValue::from_str(uri) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    response
}

pub(crate) fn not_modified() -> Response {
    StatusCode::NOT_MODIFIED.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use occigate_core::schema::infrastructure;

    #[test]
    fn test_request_body_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "category",
            HeaderValue::from_static(
                "storage; scheme=\"http://schemas.ogf.org/occi/infrastructure#\"; class=\"kind\"",
            ),
        );
        headers.insert(
            "x-occi-attribute",
            HeaderValue::from_static("occi.core.title=\"disk\""),
        );
        let parsed = request_body(&headers, &Bytes::new()).unwrap();
        assert_eq!(parsed.collection.resources.len(), 1);
        let resource = &parsed.collection.resources[0];
        assert_eq!(resource.kind, infrastructure::storage());
        assert_eq!(resource.title(), Some("disk"));
    }

    #[test]
    fn test_unsupported_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
        let err = request_body(&headers, &Bytes::from_static(b"abc")).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn test_empty_request_body() {
        let parsed = request_body(&HeaderMap::new(), &Bytes::new()).unwrap();
        assert_eq!(parsed, RequestBody::default());
    }
}
