use serde::Serialize;
use serde_json::{Map, Value, json};

/// JSON-RPC error codes emitted by the gateway.
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const UNAUTHORIZED: i64 = -32001;
    pub const FORBIDDEN: i64 = -32002;
    pub const NOT_FOUND: i64 = -32003;
    pub const RATE_LIMITED: i64 = -32004;
}

/// RFC 7807 members surfaced verbatim from upstream error bodies.
const PROBLEM_DETAIL_FIELDS: [&str; 5] = ["type", "title", "status", "detail", "invalid-params"];

/// A single field-level validation diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// A non-2xx response from the Petfinder API or its token endpoint.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("upstream responded {status} {status_text}")]
pub struct UpstreamError {
    pub status: u16,
    pub status_text: String,
    /// Parsed JSON when the body was JSON, otherwise the raw text as a string.
    pub body: Value,
}

impl UpstreamError {
    pub fn new(status: u16, status_text: impl Into<String>, body: Value) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            body,
        }
    }

    /// Protocol error code for this upstream status.
    pub fn rpc_code(&self) -> i64 {
        match self.status {
            400 => codes::INVALID_PARAMS,
            401 => codes::UNAUTHORIZED,
            403 => codes::FORBIDDEN,
            404 => codes::NOT_FOUND,
            429 => codes::RATE_LIMITED,
            _ => codes::INTERNAL_ERROR,
        }
    }

    /// Problem-detail members of the body, if the upstream sent any.
    pub fn problem_detail(&self) -> Option<Map<String, Value>> {
        let body = self.body.as_object()?;
        let detail: Map<String, Value> = PROBLEM_DETAIL_FIELDS
            .iter()
            .filter_map(|key| body.get(*key).map(|value| ((*key).to_string(), value.clone())))
            .collect();
        (!detail.is_empty()).then_some(detail)
    }

    /// Human-readable message, preferring the problem-detail title and detail.
    pub fn describe(&self) -> String {
        let problem = self.problem_detail();
        let title = problem
            .as_ref()
            .and_then(|p| p.get("title"))
            .and_then(Value::as_str);
        let detail = problem
            .as_ref()
            .and_then(|p| p.get("detail"))
            .and_then(Value::as_str);
        match (title, detail) {
            (Some(title), Some(detail)) => format!("{title}: {detail}"),
            (Some(title), None) => title.to_string(),
            (None, Some(detail)) => detail.to_string(),
            (None, None) => format!("Upstream API error: {} {}", self.status, self.status_text),
        }
    }

    /// Payload for the JSON-RPC `error.data` member.
    pub fn rpc_data(&self) -> Value {
        match self.problem_detail() {
            Some(problem) => Value::Object(problem),
            None => json!({
                "httpStatus": self.status,
                "statusText": self.status_text,
                "body": self.body,
            }),
        }
    }
}
