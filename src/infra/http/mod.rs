//! Public HTTP surface.

pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::application::rankings::RankingService;
use crate::application::reads::ReadTrackingService;
use crate::application::recommend::RecommendationService;
use crate::application::repos::{HealthRepo, PostsRepo};

use middleware::log_responses;

#[derive(Clone)]
pub struct HttpState {
    pub tracking: Arc<ReadTrackingService>,
    pub rankings: Arc<RankingService>,
    pub recommendations: Arc<RecommendationService>,
    pub posts: Arc<dyn PostsRepo>,
    pub health: Arc<dyn HealthRepo>,
    /// Public blog base URL, e.g. `https://example.com/blog`.
    pub blog_base_url: String,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/action/mark-as-read", post(handlers::mark_as_read))
        .route("/blog.json", get(handlers::blog_json))
        .route("/blog/rankings", get(handlers::rankings))
        .route("/blog/recommendations", get(handlers::recommendations))
        .route("/blog/reads", get(handlers::read_stats))
        .route("/healthz", get(handlers::healthz))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
}
