use std::sync::Arc;

use url::Url;

pub mod error;
pub mod protocol;
pub mod token_cache;
pub mod tools;
pub mod upstream;

pub use error::GatewayError;
pub use protocol::{RpcError, handle_http_jsonrpc, handle_http_payload};
pub use token_cache::{Clock, SystemClock, TokenCache};
pub use tools::{ToolId, ToolRegistry, ToolResult};
pub use upstream::UpstreamClient;

pub const DEFAULT_API_URL: &str = "https://api.petfinder.com/v2";

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    /// Petfinder API base; the token endpoint is `{api_url}/oauth2/token`.
    pub api_url: Url,
    /// Tokens are refreshed this many seconds before they expire (minimum 60).
    pub token_safety_margin_secs: i64,
}

impl GatewayConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            token_safety_margin_secs: token_cache::MIN_SAFETY_MARGIN_SECS,
        }
    }

    pub fn with_token_safety_margin(mut self, secs: i64) -> Self {
        self.token_safety_margin_secs = secs.max(token_cache::MIN_SAFETY_MARGIN_SECS);
        self
    }
}

/// Process-wide gateway state shared by every request.
///
/// The token cache inside the upstream client is the only mutable part;
/// the tool registry is immutable after construction.
pub struct Gateway {
    upstream: UpstreamClient,
    registry: ToolRegistry,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: GatewayConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            upstream: UpstreamClient::new(config.api_url, config.token_safety_margin_secs, clock),
            registry: ToolRegistry::petfinder(),
        }
    }

    pub fn upstream(&self) -> &UpstreamClient {
        &self.upstream
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}
