use std::sync::Arc;

use petfinder_core::Credentials;
use petfinder_core::error::UpstreamError;
use serde_json::{Map, Value};
use url::Url;

use crate::error::GatewayError;
use crate::token_cache::{Clock, TokenCache};

/// Authenticated GET client for the Petfinder v2 API.
///
/// No retries and no timeout override: transient upstream failures surface
/// directly to the caller.
pub struct UpstreamClient {
    http: reqwest::Client,
    base_url: Url,
    tokens: TokenCache,
}

impl UpstreamClient {
    pub fn new(base_url: Url, token_safety_margin_secs: i64, clock: Arc<dyn Clock>) -> Self {
        let http = reqwest::Client::new();
        let token_url = join_path(&base_url, &["oauth2", "token"]);
        let tokens = TokenCache::new(http.clone(), token_url, token_safety_margin_secs, clock);
        Self {
            http,
            base_url,
            tokens,
        }
    }

    /// GET `path` below the API base with the caller's bearer token.
    pub async fn get(
        &self,
        credentials: &Credentials,
        path: &[&str],
        query: &Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let token = self.tokens.get_token(credentials).await?;
        let url = join_path(&self.base_url, path);
        let pairs = flatten_query(query);

        tracing::debug!(
            event = "upstream_request",
            path = %url.path(),
            query_pairs = pairs.len(),
            client = %credentials.fingerprint(),
        );

        let response = self
            .http
            .get(url.clone())
            .bearer_auth(token)
            .query(&pairs)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        let body = parse_response_body(&bytes);

        if !status.is_success() {
            tracing::warn!(
                event = "upstream_error",
                path = %url.path(),
                status = status.as_u16(),
                client = %credentials.fingerprint(),
            );
            return Err(GatewayError::UpstreamApi(UpstreamError::new(
                status.as_u16(),
                status.canonical_reason().unwrap_or_default(),
                body,
            )));
        }

        Ok(body)
    }
}

/// Append percent-encoded path segments to a base URL.
pub(crate) fn join_path(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

/// Flatten query parameters into ordered pairs.
///
/// Arrays become repeated keys; nulls (including null array items) and
/// nested objects are dropped.
pub fn flatten_query(query: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in query {
        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(rendered) = scalar_to_string(item) {
                        pairs.push((key.clone(), rendered));
                    }
                }
            }
            other => {
                if let Some(rendered) = scalar_to_string(other) {
                    pairs.push((key.clone(), rendered));
                }
            }
        }
    }
    pairs
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Best-effort body decoding: JSON when possible, raw text otherwise.
pub(crate) fn parse_response_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).to_string()))
}
