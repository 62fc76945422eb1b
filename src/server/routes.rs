//! Route table for the prediction server
//!
//! Paths are registered without trailing slashes; the server wraps the
//! app in trimming path normalization so both spellings resolve here.

use super::handlers;
use actix_web::web;

/// Configure all server routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Liveness endpoints, valid in any load phase
        .route("/", web::get().to(handlers::index))
        .route("/ping", web::get().to(handlers::index))
        .route("/health", web::get().to(handlers::health_check))
        .route("/stats", web::get().to(handlers::stats))
        // Scoring endpoints, gated on the Ready phase
        .route("/predict", web::post().to(handlers::predict))
        .route(
            "/predictUnstructured",
            web::post().to(handlers::predict_unstructured),
        )
        .route("/transform", web::post().to(handlers::transform))
        // Catch-all for unmatched routes
        .default_service(web::route().to(handlers::not_found));
}
