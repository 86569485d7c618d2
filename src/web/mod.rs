//! Operator HTTP API

pub mod handlers;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::sms::SmsSender;
use crate::source::SourceFactory;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

/// Shared state behind every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    pub sources: SourceFactory,
    pub sender: Option<Arc<dyn SmsSender>>,
    pub started: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        dispatcher: Arc<Dispatcher>,
        sources: SourceFactory,
        sender: Option<Arc<dyn SmsSender>>,
    ) -> Self {
        Self {
            config,
            dispatcher,
            sources,
            sender,
            started: Instant::now(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/status", get(handlers::status))
        .route("/api/alarms", get(handlers::recent_alarms))
        .route("/api/check-alarms", post(handlers::check_alarms))
        .route("/api/config", get(handlers::config))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Serve `app` until `shutdown` flips to true
pub async fn serve(
    addr: SocketAddr,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Web API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        })
        .await?;

    info!("Web API stopped");
    Ok(())
}
