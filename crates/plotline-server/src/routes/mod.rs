// Export route modules
pub mod chat;
pub mod charts;
pub mod status;

use crate::state::AppState;
use axum::Router;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(chat::routes(state.clone()))
        .merge(charts::routes())
        .merge(status::routes())
}
