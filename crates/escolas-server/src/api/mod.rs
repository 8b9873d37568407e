pub mod response;
pub mod schools;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use escolas_core::AppCore;

/// Application state shared across all API handlers.
pub type AppState = Arc<AppCore>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(schools::service_info))
        .route("/status", get(schools::system_status))
        .route("/atualizar", post(schools::atualizar))
        .route("/escola/{codigo}", get(schools::escola_por_codigo))
        .route("/escolas", get(schools::listar_escolas))
        .route("/buscar", get(schools::buscar_escolas))
        .fallback(schools::endpoint_nao_encontrado)
        .with_state(state)
}
