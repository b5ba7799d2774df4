pub mod health;
pub mod parameters;

use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Build the full router. Every parent family shares one pair of routes;
/// the `:parent_type` segment is checked when the parent is resolved.
pub fn router(state: AppState) -> Router {
    // CORS layer: allow requests from any origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health::health))
        .route(
            "/api/:parent_type/:parent_id/parameters",
            get(parameters::index)
                .post(parameters::create)
                .delete(parameters::reset),
        )
        .route(
            "/api/:parent_type/:parent_id/parameters/:id",
            get(parameters::show)
                .put(parameters::update)
                .delete(parameters::destroy),
        )
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
