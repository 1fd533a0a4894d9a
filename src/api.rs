pub(crate) mod fetch;
pub(crate) mod generate;
pub(crate) mod health;
pub(crate) mod metrics;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::app::AppState;

pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/health/ready", get(health::ready))
        .route("/health/live", get(health::live))
        .route("/metrics", get(metrics::exporter))
        .route("/v1/jobs/weekly", post(generate::trigger_weekly))
        .route(
            "/v1/podcasts/{user_id}",
            get(fetch::podcast_history).post(generate::trigger_for_user),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
