use crate::AppState;
use axum::Router;

pub mod health;
pub mod internal;
pub mod v1;

/// Merge all public routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(health::routes())
        .nest("/api/v1", v1::routes())
}
