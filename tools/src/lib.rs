//! desk-server: HTTP surface for the payout desk.

pub mod routes;
pub mod settings;
pub mod state;
pub mod tradesviz;

use axum::Router;
use std::sync::Arc;

pub fn build_app(state: Arc<state::AppState>) -> Router {
    routes::create_router(state)
}
