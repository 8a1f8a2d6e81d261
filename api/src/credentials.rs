//! Per-request Petfinder client credentials.
//!
//! Headers take precedence over the query string field by field. Values are
//! trimmed and blank values count as absent.

use axum::http::HeaderMap;
use petfinder_core::Credentials;
use url::form_urlencoded;

pub const CLIENT_ID_HEADER: &str = "x-petfinder-client-id";
pub const CLIENT_SECRET_HEADER: &str = "x-petfinder-client-secret";
pub const CLIENT_ID_QUERY: &str = "petfinder_client_id";
pub const CLIENT_SECRET_QUERY: &str = "petfinder_client_secret";

/// Resolve credentials from request headers, falling back to the raw query.
///
/// Returns `None` unless both the client id and secret resolve.
pub fn extract_credentials(headers: &HeaderMap, query: Option<&str>) -> Option<Credentials> {
    let client_id = resolve_field(headers, CLIENT_ID_HEADER, query, CLIENT_ID_QUERY)?;
    let client_secret = resolve_field(headers, CLIENT_SECRET_HEADER, query, CLIENT_SECRET_QUERY)?;
    Some(Credentials::new(client_id, client_secret))
}

fn resolve_field(
    headers: &HeaderMap,
    header: &str,
    query: Option<&str>,
    query_key: &str,
) -> Option<String> {
    header_value(headers, header).or_else(|| query.and_then(|q| query_value(q, query_key)))
}

fn header_value(headers: &HeaderMap, key: &str) -> Option<String> {
    headers
        .get(key)
        .and_then(|value| value.to_str().ok())
        .and_then(non_blank)
}

fn query_value(query: &str, key: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(name, _)| name == key)
        .and_then(|(_, value)| non_blank(&value))
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
