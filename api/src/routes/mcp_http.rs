use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::Value;

use crate::credentials::extract_credentials;
use crate::state::AppState;

const MCP_PATH: &str = "/mcp";

pub fn router() -> Router<AppState> {
    Router::new().route(MCP_PATH, post(mcp_post).get(mcp_get))
}

async fn mcp_get() -> Response {
    StatusCode::METHOD_NOT_ALLOWED.into_response()
}

async fn mcp_post(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let credentials = extract_credentials(&headers, query.as_deref());
    let mut responses =
        petfinder_mcp_runtime::handle_http_payload(&state.gateway, credentials, &body).await;

    if responses.is_empty() {
        return StatusCode::ACCEPTED.into_response();
    }

    if responses.len() == 1 {
        return (StatusCode::OK, Json(responses.swap_remove(0))).into_response();
    }

    (StatusCode::OK, Json(Value::Array(responses))).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use mockito::{Matcher, Server};
    use petfinder_mcp_runtime::{Gateway, GatewayConfig};
    use serde_json::json;
    use tower::ServiceExt;
    use url::Url;

    use super::*;
    use crate::routes::health;

    fn app(api_url: &str) -> Router {
        let config = GatewayConfig::new(Url::parse(api_url).expect("api url should parse"));
        Router::new()
            .merge(router())
            .merge(health::router())
            .with_state(AppState::new(Gateway::new(config)))
    }

    fn offline_app() -> Router {
        app("http://127.0.0.1:9")
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        serde_json::from_slice(&bytes).expect("body should be json")
    }

    #[tokio::test]
    async fn tools_list_works_without_credentials() {
        let response = offline_app()
            .oneshot(post_json(
                "/mcp",
                json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }),
            ))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_json(response).await;
        assert_eq!(payload["result"]["tools"].as_array().map(Vec::len), Some(7));
    }

    #[tokio::test]
    async fn tools_call_without_credentials_is_unauthorized() {
        let response = offline_app()
            .oneshot(post_json(
                "/mcp",
                json!({
                    "jsonrpc": "2.0",
                    "id": 2,
                    "method": "tools/call",
                    "params": { "name": "types.list", "arguments": {} }
                }),
            ))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_json(response).await;
        assert_eq!(payload["error"]["code"], -32001);
        assert!(payload.get("result").is_none());
    }

    #[tokio::test]
    async fn notification_only_body_returns_accepted() {
        let response = offline_app()
            .oneshot(post_json(
                "/mcp",
                json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }),
            ))
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn batch_returns_json_array() {
        let response = offline_app()
            .oneshot(post_json(
                "/mcp",
                json!([
                    { "jsonrpc": "2.0", "id": 1, "method": "ping" },
                    { "jsonrpc": "2.0", "id": 2, "method": "initialize" }
                ]),
            ))
            .await
            .expect("request should succeed");

        let payload = body_json(response).await;
        let items = payload.as_array().expect("batch response should be an array");
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["result"]["serverInfo"]["name"], "petfinder-mcp");
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let response = offline_app()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .body(Body::from("{\"jsonrpc\":"))
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_json(response).await;
        assert_eq!(payload["error"]["code"], -32700);
        assert_eq!(payload["id"], Value::Null);
    }

    #[tokio::test]
    async fn get_mcp_is_method_not_allowed() {
        let response = offline_app()
            .oneshot(
                Request::builder()
                    .uri("/mcp")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn health_returns_plain_ok() {
        let response = offline_app()
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request should build"),
            )
            .await
            .expect("request should succeed");

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get("content-type")
            .expect("content-type should exist")
            .to_str()
            .expect("content-type should be ascii")
            .to_string();
        assert!(content_type.starts_with("text/plain"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body should read");
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn query_credentials_reach_the_token_endpoint() {
        let mut server = Server::new_async().await;
        let token = server
            .mock("POST", "/oauth2/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("client_id".into(), "query-client".into()),
                Matcher::UrlEncoded("client_secret".into(), "query-secret".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"token_type":"Bearer","expires_in":3600,"access_token":"abc"}"#)
            .expect(1)
            .create_async()
            .await;
        let types = server
            .mock("GET", "/types/Dog")
            .match_header("authorization", "Bearer abc")
            .with_status(200)
            .with_body(r#"{"type":{"name":"Dog","coats":["Short"]}}"#)
            .create_async()
            .await;

        let response = app(&server.url())
            .oneshot(post_json(
                "/mcp?petfinder_client_id=query-client&petfinder_client_secret=query-secret",
                json!({
                    "jsonrpc": "2.0",
                    "id": "t",
                    "method": "tools/call",
                    "params": { "name": "types.get", "arguments": { "type": "Dog" } }
                }),
            ))
            .await
            .expect("request should succeed");

        let payload = body_json(response).await;
        assert_eq!(
            payload["result"]["content"][0]["text"],
            "Animal type details for 'Dog':"
        );
        token.assert_async().await;
        types.assert_async().await;
    }
}
