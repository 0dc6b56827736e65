//! API Server - HTTP server for the verification boundary

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api::handlers::{self, AppState};

pub struct ApiServer {
    state: Arc<AppState>,
    addr: String,
}

impl ApiServer {
    pub fn new(state: AppState, addr: String) -> Self {
        Self {
            state: Arc::new(state),
            addr,
        }
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/health", get(handlers::health))
            .route(
                "/email-config/:org_id",
                get(handlers::get_settings).put(handlers::update_settings),
            )
            .route(
                "/email-config/:org_id/dns-records",
                get(handlers::dns_records),
            )
            .route("/email-config/:org_id/verify", post(handlers::verify))
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Start the API server
    pub async fn run(&self) -> std::io::Result<()> {
        let router = self.router();

        info!("Starting API server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
