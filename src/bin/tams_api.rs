//! TAMS API Binary
//!
//! Serves Source/Flow relationship diagrams (JSON and Mermaid) and the
//! deployment's feature flags.
//!
//! Environment Variables:
//! - TAMS_ENDPOINT: base URL of the TAMS API
//! - TAMS_TOKEN, or TOKEN_URL + CLIENT_ID + CLIENT_SECRET (+ TAMS_SCOPES)
//! - ADDR / PORT: bind address (default 127.0.0.1:3000)

use std::sync::Arc;
use tams_tools::adapters::http::{router, AppState};
use tams_tools::adapters::tams::{TamsClient, TokenProvider};
use tams_tools::application::catalog::CatalogService;
use tams_tools::ports::tams::TamsApi;
use tams_tools::{ApiConfig, FeatureFlags, TamsConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ApiConfig::from_env();
    let tams = TamsConfig::from_env().expect("TAMS configuration");

    let http = reqwest::Client::new();
    let tokens = TokenProvider::new(http.clone(), tams.credentials);
    let client = TamsClient::new(http, &tams.endpoint, tokens).expect("valid TAMS_ENDPOINT");
    let api: Arc<dyn TamsApi> = Arc::new(client);

    let app = router(AppState::new(CatalogService::new(api), FeatureFlags::from_env()));

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    info!("Listening at {}:{}", config.addr, config.port);
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
