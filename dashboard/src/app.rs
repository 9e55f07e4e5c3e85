use crate::directory::Directory;
use crate::metrics;
use crate::notify::{self, NotificationSender};
use crate::query::Projection;
use crate::rest;
use axum::{routing::get, Router};
use std::sync::Arc;

/// Notification receiver, query API, metrics and health check on one listener.
pub fn build_router(
    notifications: NotificationSender,
    projection: Projection,
    directory: Arc<dyn Directory>,
    cse_name: &str,
) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz))
        .merge(notify::create_router(notifications))
        .merge(rest::create_router(projection, directory, cse_name))
}

async fn metrics_handler() -> String {
    metrics::gather_metrics()
}

async fn healthz() -> &'static str {
    "ok"
}
