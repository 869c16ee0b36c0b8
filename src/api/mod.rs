pub mod bounties;
pub mod funds;
pub mod health;
pub mod projections;

use crate::config::Config;
use crate::orchestration::Projector;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub projector: Arc<Projector>,
    pub config: Config,
}

impl AppState {
    pub fn new(projector: Arc<Projector>, config: Config) -> Self {
        Self { projector, config }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/bounties", get(bounties::list_bounties))
        .route("/v1/bounties/:id", get(bounties::get_bounty))
        .route("/v1/funds", get(funds::list_funds))
        .route("/v1/funds/:id", get(funds::get_fund))
        .layer(cors)
        .with_state(state)
}
