use axum::Router;

use crate::AppContext;

mod analyze_vitals;
mod health;

// ---

pub fn router(ctx: AppContext) -> Router {
    // ---
    Router::new()
        .merge(analyze_vitals::router())
        .merge(health::router())
        .with_state(ctx)
}
