//! Application route configuration.

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use common::{health_report, HealthResponse};
use utoipa_swagger_ui::SwaggerUi;

use super::handlers::email_routes;
use super::openapi::ApiDoc;
use super::AppState;

/// Create the application router with all routes configured
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(email_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check with store and channel connectivity
async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    health_report(state.store.ping().await, state.channel.ping().await)
}
