use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;

use super::handlers;
use crate::service::{DiscrepancyChecker, MatcherService};

/// 共享状态
#[derive(Clone)]
pub struct AppState {
    pub matcher: Arc<MatcherService>,
    pub checker: Arc<DiscrepancyChecker>,
    pub pool: PgPool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/api/match/preview", post(handlers::preview_match))
        .route("/api/match/batch", post(handlers::batch_match))
        .route("/api/match/export", post(handlers::export_matches))
        .route("/api/discrepancies/check", post(handlers::check_discrepancies))
        .route("/api/discrepancies/export", post(handlers::export_discrepancies))
        .route("/api/matches/:id/status", post(handlers::update_match_status))
        .route("/api/flags/:id/resolve", post(handlers::resolve_flag))
        .layer(ServiceBuilder::new())
        .with_state(state)
}
