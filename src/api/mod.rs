pub mod admin;
pub mod health;
pub mod ledger;

use crate::db::Repository;
use crate::distribution::{LifecycleManager, ProfitDistributor};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub distributor: Arc<ProfitDistributor>,
    pub lifecycle: Arc<LifecycleManager>,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        distributor: Arc<ProfitDistributor>,
        lifecycle: Arc<LifecycleManager>,
    ) -> Self {
        Self {
            repo,
            distributor,
            lifecycle,
        }
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
        .route("/v1/admin/distribute", post(admin::distribute))
        .route("/v1/admin/complete-expired", post(admin::complete_expired))
        .route("/v1/positions/:id/ledger", get(ledger::get_position_ledger))
        .route("/v1/accounts/:user/ledger", get(ledger::get_account_ledger))
        .layer(cors)
        .with_state(state)
}
