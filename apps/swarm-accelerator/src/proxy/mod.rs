//! Origin forwarding
//!
//! Replays a client request against the origin node and relays the response
//! back as a stream. Status, headers and body are passed through untouched
//! apart from hop-by-hop headers.

use std::time::Duration;

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderName};
use axum::response::Response;
use reqwest::Url;

use crate::config::OriginConfig;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("Invalid origin URL {url}: {reason}")]
    InvalidOrigin { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(reqwest::Error),

    #[error("Origin request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

/// Headers that describe a single connection and are never relayed
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Reverse-proxy client for the origin node
#[derive(Clone)]
pub struct OriginForwarder {
    client: reqwest::Client,
    base: Url,
}

impl OriginForwarder {
    pub fn new(config: &OriginConfig) -> Result<Self, ForwardError> {
        let mut raw = config.url.clone();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        let base = Url::parse(&raw).map_err(|e| ForwardError::InvalidOrigin {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ForwardError::InvalidOrigin {
                url: config.url.clone(),
                reason: format!("unsupported scheme {}", base.scheme()),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(ForwardError::Client)?;

        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Forward a request and relay the origin's response
    ///
    /// Any origin status, including errors, is relayed as-is. Only transport
    /// failures surface as `ForwardError`.
    pub async fn forward(&self, request: Request) -> Result<Response, ForwardError> {
        let (parts, body) = request.into_parts();
        let target = self.target_url(parts.uri.path_and_query().map(|pq| pq.as_str()))?;

        let has_body = parts.headers.contains_key(header::CONTENT_LENGTH)
            || parts.headers.contains_key(header::TRANSFER_ENCODING);

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);

        tracing::debug!(method = %parts.method, target = %target, "Forwarding to origin");

        let mut builder = self.client.request(parts.method, target).headers(headers);
        if has_body {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream = builder.send().await?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }

    fn target_url(&self, path_and_query: Option<&str>) -> Result<Url, ForwardError> {
        let relative = path_and_query.unwrap_or("/").trim_start_matches('/');
        self.base.join(relative).map_err(|e| ForwardError::InvalidOrigin {
            url: self.base.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Remove hop-by-hop headers, including any named by `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}
