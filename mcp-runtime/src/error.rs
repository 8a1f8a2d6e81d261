use petfinder_core::error::UpstreamError;
use petfinder_core::schema::ValidationError;

/// Failures raised below the protocol boundary.
///
/// Every variant is converted into a JSON-RPC error envelope by the protocol
/// adapter; none of them reach the HTTP transport.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Petfinder client id and client secret are required")]
    CredentialsMissing,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The OAuth token endpoint rejected the client credentials.
    #[error("token exchange failed: {0}")]
    UpstreamAuth(UpstreamError),

    #[error("upstream request failed: {0}")]
    UpstreamApi(UpstreamError),

    #[error("could not reach the Petfinder API: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("tool not found: {0}")]
    ToolNotFound(String),
}
