//! JSON-RPC 2.0 adapter for the MCP methods the gateway serves.
//!
//! Each message is handled independently: parse, resolve the method, run it
//! and emit exactly one response (or none for notifications). Nothing but
//! the token cache outlives a request.

use std::time::Instant;

use petfinder_core::Credentials;
use petfinder_core::error::codes;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::GatewayError;
use crate::Gateway;

pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";
pub const MCP_SERVER_NAME: &str = "petfinder-mcp";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(codes::PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(codes::METHOD_NOT_FOUND, format!("Method not found: {method}"))
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(codes::UNAUTHORIZED, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, message)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl From<GatewayError> for RpcError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::CredentialsMissing => authentication_required(),
            GatewayError::Validation(validation) => {
                let message = validation.to_string();
                RpcError::invalid_params(message).with_data(json!({ "issues": validation.issues }))
            }
            GatewayError::UpstreamAuth(upstream) => RpcError::new(
                upstream.rpc_code(),
                format!("Petfinder authentication failed: {}", upstream.describe()),
            )
            .with_data(upstream.rpc_data()),
            GatewayError::UpstreamApi(upstream) => {
                RpcError::new(upstream.rpc_code(), upstream.describe()).with_data(upstream.rpc_data())
            }
            GatewayError::Transport(err) => {
                RpcError::internal(format!("Could not reach the Petfinder API: {err}"))
            }
            GatewayError::ToolNotFound(name) => {
                RpcError::new(codes::METHOD_NOT_FOUND, format!("Tool not found: {name}"))
            }
        }
    }
}

fn authentication_required() -> RpcError {
    RpcError::unauthorized("Authentication required").with_data(json!({
        "hint": "Send Petfinder client credentials in the x-petfinder-client-id and x-petfinder-client-secret headers."
    }))
}

/// Handle a raw HTTP body. Unparseable bodies yield a single parse error.
pub async fn handle_http_payload(
    gateway: &Gateway,
    credentials: Option<Credentials>,
    body: &[u8],
) -> Vec<Value> {
    match serde_json::from_slice::<Value>(body) {
        Ok(incoming) => handle_http_jsonrpc(gateway, credentials, incoming).await,
        Err(err) => {
            tracing::debug!(event = "mcp_parse_error", error = %err, body_len = body.len());
            vec![RpcResponse::failure(Value::Null, RpcError::parse_error()).into_value()]
        }
    }
}

/// Handle one parsed JSON-RPC message or batch with the caller's credentials.
///
/// Credentials are scoped to this call and passed down explicitly.
pub async fn handle_http_jsonrpc(
    gateway: &Gateway,
    credentials: Option<Credentials>,
    incoming: Value,
) -> Vec<Value> {
    let credentials = credentials.filter(Credentials::is_complete);
    gateway
        .handle_incoming_message(incoming, credentials.as_ref())
        .await
        .into_iter()
        .map(RpcResponse::into_value)
        .collect()
}

/// One inbound JSON-RPC message, sorted by what it asks of the gateway.
enum Incoming {
    Request { id: Value, method: String, params: Value },
    Notification { method: String },
    /// A reply from the client; the gateway never issues requests of its own.
    ClientResponse,
    Invalid { id: Value, error: RpcError },
}

impl Incoming {
    fn classify(message: Value) -> Self {
        let Value::Object(mut obj) = message else {
            return Incoming::Invalid {
                id: Value::Null,
                error: RpcError::invalid_request("Request must be a JSON object"),
            };
        };

        let id = obj.remove("id");
        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            return Incoming::Invalid {
                id: id.unwrap_or(Value::Null),
                error: RpcError::invalid_request("jsonrpc must be '2.0'"),
            };
        }

        match (obj.remove("method"), id) {
            (Some(Value::String(method)), Some(id)) => Incoming::Request {
                id,
                method,
                params: obj.remove("params").unwrap_or(Value::Null),
            },
            (Some(Value::String(method)), None) => Incoming::Notification { method },
            (None, _) if obj.contains_key("result") || obj.contains_key("error") => {
                Incoming::ClientResponse
            }
            (_, id) => Incoming::Invalid {
                id: id.unwrap_or(Value::Null),
                error: RpcError::invalid_request("Request must carry a string 'method'"),
            },
        }
    }
}

/// Outbound envelope; exactly one of `result` and `error` is set.
#[derive(Debug, Serialize)]
struct RpcResponse {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

impl RpcResponse {
    fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(error),
        }
    }

    fn into_value(self) -> Value {
        serde_json::to_value(&self).unwrap_or_else(|err| {
            tracing::error!(event = "mcp_response_encode_failed", error = %err);
            Value::Null
        })
    }
}

impl Gateway {
    async fn handle_incoming_message(
        &self,
        incoming: Value,
        credentials: Option<&Credentials>,
    ) -> Vec<RpcResponse> {
        match incoming {
            Value::Array(batch) if batch.is_empty() => vec![RpcResponse::failure(
                Value::Null,
                RpcError::invalid_request("Batch request must not be empty"),
            )],
            Value::Array(batch) => {
                let mut responses = Vec::with_capacity(batch.len());
                for message in batch {
                    responses.extend(self.handle_single_message(message, credentials).await);
                }
                responses
            }
            message => self
                .handle_single_message(message, credentials)
                .await
                .into_iter()
                .collect(),
        }
    }

    async fn handle_single_message(
        &self,
        message: Value,
        credentials: Option<&Credentials>,
    ) -> Option<RpcResponse> {
        match Incoming::classify(message) {
            Incoming::Request { id, method, params } => {
                Some(match self.handle_request(&method, params, credentials).await {
                    Ok(result) => RpcResponse::success(id, result),
                    Err(err) => RpcResponse::failure(id, err),
                })
            }
            Incoming::Notification { method } => {
                self.handle_notification(&method);
                None
            }
            Incoming::ClientResponse => None,
            Incoming::Invalid { id, error } => Some(RpcResponse::failure(id, error)),
        }
    }

    /// Notifications (initialized, cancelled, ...) change no gateway state.
    fn handle_notification(&self, method: &str) {
        tracing::debug!(event = "mcp_notification", method = %method);
    }

    async fn handle_request(
        &self,
        method: &str,
        params: Value,
        credentials: Option<&Credentials>,
    ) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(self.tools_list_payload()),
            "tools/call" => self.handle_tools_call(params, credentials).await,
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {
                    "listChanged": true
                }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    fn tools_list_payload(&self) -> Value {
        let tools: Vec<Value> = self
            .registry()
            .definitions()
            .map(|definition| definition.to_value())
            .collect();
        json!({ "tools": tools })
    }

    async fn handle_tools_call(
        &self,
        params: Value,
        credentials: Option<&Credentials>,
    ) -> Result<Value, RpcError> {
        let Some(credentials) = credentials else {
            let tool = params.get("name").and_then(Value::as_str).unwrap_or_default();
            tracing::info!(event = "mcp_tool_call_unauthenticated", tool = %tool);
            return Err(authentication_required());
        };

        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let arguments = match params.get("arguments") {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        let started = Instant::now();
        let outcome = self
            .registry()
            .dispatch(self.upstream(), name, arguments, credentials)
            .await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                tracing::info!(
                    event = "mcp_tool_call",
                    tool = %name,
                    client = %credentials.fingerprint(),
                    outcome = "ok",
                    elapsed_ms,
                );
                serde_json::to_value(result)
                    .map_err(|err| RpcError::internal(format!("Failed to encode tool result: {err}")))
            }
            Err(err) => {
                tracing::warn!(
                    event = "mcp_tool_call",
                    tool = %name,
                    client = %credentials.fingerprint(),
                    outcome = "error",
                    error = %err,
                    elapsed_ms,
                );
                Err(err.into())
            }
        }
    }
}
