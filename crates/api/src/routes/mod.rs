pub mod generate;
pub mod health;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /generate/wan-pro                  submit image→video job (queue + webhook)
/// /generate/flux-kontext-max-multi   submit multi-image job (queue + webhook)
/// /generate/flux-kontext             submit image-edit job (legacy polling)
/// /webhooks/fal                      provider + FFmpeg callbacks
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(generate::router())
        .merge(webhooks::router())
}
