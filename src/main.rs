mod app_config;
mod chat;
mod data;
mod db;
mod error;
mod llm;
mod service;
mod track;
mod visits;

use std::path::Path;
use std::sync::Arc;

use crate::app_config::{AppConfig, Conf};
use crate::chat::chat_handler;
use crate::llm::{openai::OpenAiClient, ChatCompleter};
use crate::service::EventStore;
use crate::track::track_handler;
use crate::visits::{track_visits, VisitFilter};

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use config::FileFormat;
use log::{error, info};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;

#[derive(Clone)]
pub struct AppState {
    store: Arc<dyn EventStore>,
    completer: Arc<dyn ChatCompleter>,
    filter: VisitFilter,
    site_owner: Arc<str>,
}

impl AppState {
    async fn init(conf: &Conf) -> Result<Self, anyhow::Error> {
        let store = service::init_store(conf).await?;
        let completer: Arc<dyn ChatCompleter> = Arc::new(OpenAiClient::init(
            conf.openai_base_url.clone(),
            conf.openai_api_key.clone().unwrap_or_default(),
            conf.openai_model.clone(),
            conf.chat_temperature,
            conf.chat_max_tokens,
        ));
        if conf.track_root_only {
            info!("Tracking visits to the landing page only");
        }
        Ok(Self {
            store,
            completer,
            filter: VisitFilter::new(conf.track_root_only),
            site_owner: Arc::from(conf.site_owner.as_str()),
        })
    }
}

/// API routes plus the static site, with visit tracking in front of all of it.
pub fn build_router(state: AppState, site_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat_handler))
        .route("/api/track", post(track_handler))
        .fallback_service(ServeDir::new(site_dir))
        .layer(middleware::from_fn_with_state(state.clone(), track_visits))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::init();
    let conf = AppConfig::init()
        .from_optional_file("config.json", FileFormat::Json)
        .from_env()
        .parse();
    conf.validate()?;

    let state = AppState::init(&conf).await?;
    info!("Serving site from {}", conf.site_dir);
    let app = build_router(state, &conf.site_dir);

    info!("Starting server on {}:{}", conf.host, conf.port);
    let listener = TcpListener::bind(format!("{}:{}", conf.host, conf.port)).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for ctrl-c: {}", e);
            }
            info!("shutting down");
        })
        .await?;
    Ok(())
}

async fn health() -> &'static str {
    "OK"
}
