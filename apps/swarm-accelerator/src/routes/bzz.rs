//! Manifest content route
//!
//! GET /bzz/*address serves `{root}[/{path}]` from cached manifests and
//! forwards everything it cannot fully answer.

use axum::{
    body::Body,
    extract::{Path, Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;

use crate::gateway::{ContentBody, LocalContent};
use crate::state::AppState;

/// GET /bzz/*address
pub async fn get_content(
    State(state): State<AppState>,
    Path(address): Path<String>,
    request: Request,
) -> Response {
    let gateway = state.gateway();
    let outcome = gateway.local_content(&address).await;
    gateway.respond(outcome, request, content_response).await
}

fn content_response(content: LocalContent) -> Response {
    let reference = &content.reference;
    let file_name = reference.file_name();

    let content_type = reference
        .content_type()
        .map(str::to_string)
        .or_else(|| {
            file_name
                .and_then(|name| mime_guess::from_path(name).first())
                .map(|m| m.to_string())
        })
        .unwrap_or_else(|| "application/octet-stream".to_string());

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content.body.len()));
    if let Some(value) = file_name.and_then(content_disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }

    tracing::debug!(
        hash = %reference.hash,
        size = content.body.len(),
        content_type = %content_type,
        "Serving cached content"
    );

    let body = match content.body {
        ContentBody::Buffered(bytes) => Body::from(bytes),
        ContentBody::Streamed(joined) => {
            let root = joined.root_hash();
            Body::from_stream(joined.into_stream().inspect_err(move |e| {
                tracing::error!(root = %root, error = %e, "Aborting content stream");
            }))
        }
    };

    (StatusCode::OK, headers, body).into_response()
}

fn content_disposition(file_name: &str) -> Option<HeaderValue> {
    if file_name.is_ascii() && !file_name.contains('"') {
        if let Ok(value) = HeaderValue::from_str(&format!("inline; filename=\"{}\"", file_name)) {
            return Some(value);
        }
    }
    HeaderValue::from_str(&format!(
        "inline; filename*=UTF-8''{}",
        urlencoding::encode(file_name)
    ))
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition() {
        assert_eq!(
            content_disposition("index.html").unwrap(),
            "inline; filename=\"index.html\""
        );
        assert_eq!(
            content_disposition("café \"menu\".pdf").unwrap(),
            "inline; filename*=UTF-8''caf%C3%A9%20%22menu%22.pdf"
        );
    }
}
