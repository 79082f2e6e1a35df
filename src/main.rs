mod models;
mod service;
mod config;
mod dtos;
mod error;
mod utils;
mod handler;
mod routes;

use std::sync::Arc;

use anyhow::Context;
use axum::http::{header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE}, HeaderValue, Method};
use config::Config;
use dotenv::dotenv;
use routes::create_router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

use service::{
    downline_service::DownlineService,
    generation_source::HttpGenerationSource,
};

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub downline_service: Arc<DownlineService>,
}

impl AppState {
    pub fn new(config: Config, downline_service: DownlineService) -> Self {
        Self {
            env: config,
            downline_service: Arc::new(downline_service),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    dotenv().ok();

    let config = Config::init().map_err(anyhow::Error::msg)?;

    let source = HttpGenerationSource::new(&config)
        .context("Failed to build the upstream referral client")?;
    tracing::info!("Referral data is read from {}", config.upstream_api_url);

    let downline_service = DownlineService::new(
        Arc::new(source),
        config.currency.clone(),
        config.export_locale,
    );

    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid origin {}: {}", origin, e);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET]);

    let app_state = Arc::new(AppState::new(config.clone(), downline_service));

    let app = create_router(app_state).layer(cors);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", &config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;

    tracing::info!("🚀 Server is running on http://localhost:{}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
