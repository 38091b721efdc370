use axum::routing::post;
use axum::Router;

use crate::handlers::generate;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/generate/wan-pro", post(generate::wan_pro))
        .route(
            "/generate/flux-kontext-max-multi",
            post(generate::flux_kontext_max_multi),
        )
        .route("/generate/flux-kontext", post(generate::flux_kontext))
}
