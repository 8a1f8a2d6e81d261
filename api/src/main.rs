use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;

use axum::Router;
use clap::Parser;
use petfinder_mcp_runtime::{DEFAULT_API_URL, Gateway, GatewayConfig};
use tower::ServiceBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

mod credentials;
mod middleware;
mod routes;
mod state;

#[derive(Parser, Debug)]
#[command(
    name = "petfinder-mcp-gateway",
    version,
    about = "MCP gateway exposing the Petfinder v2 API as tools over HTTP"
)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Interface to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: IpAddr,

    /// Petfinder API base URL
    #[arg(long, env = "PETFINDER_API_URL", default_value = DEFAULT_API_URL)]
    upstream_url: Url,

    /// Refresh cached tokens this many seconds before expiry (minimum 60)
    #[arg(long, env = "PETFINDER_TOKEN_SAFETY_MARGIN_SECS", default_value_t = 60)]
    token_safety_margin_secs: i64,
}

fn build_app(state: state::AppState) -> Router {
    Router::new()
        .merge(routes::mcp_http::router())
        .merge(routes::health::router())
        .layer(
            ServiceBuilder::new()
                .layer(middleware::trace::build_trace_layer())
                .layer(middleware::cors::build_cors_layer()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "petfinder_api=info,petfinder_mcp_runtime=info,tower_http=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = GatewayConfig::new(cli.upstream_url)
        .with_token_safety_margin(cli.token_safety_margin_secs);
    tracing::info!(
        event = "gateway_configured",
        upstream = %config.api_url,
        token_safety_margin_secs = config.token_safety_margin_secs,
    );
    let app = build_app(state::AppState::new(Gateway::new(config)));

    let addr = SocketAddr::new(cli.host, cli.port);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(event = "bind_failed", %addr, error = %err);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Petfinder MCP gateway listening on {}", addr);

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!(event = "server_failed", error = %err);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
