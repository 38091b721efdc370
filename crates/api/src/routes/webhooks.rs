use axum::routing::post;
use axum::Router;

use crate::handlers::fal_webhook;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/fal", post(fal_webhook::receive_webhook))
}
