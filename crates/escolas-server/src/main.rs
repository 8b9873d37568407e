mod api;

use std::sync::Arc;

use axum::http::{Method, header};
use escolas_core::{AppConfig, AppCore};
use tower_http::cors::CorsLayer;

#[tokio::main]
async fn main() {
    // Initialize tracing logger
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,escolas_server=debug".into()),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting school catalog API");

    let config = AppConfig::from_env();
    let port = config.port;
    let core = Arc::new(
        AppCore::new(config)
            .await
            .expect("Failed to initialize app core"),
    );

    if core.catalog.is_empty() {
        tracing::warn!("no dataset loaded; POST /atualizar will download one");
    } else {
        tracing::info!(schools = core.catalog.len(), "dataset ready");
    }

    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let app = api::router(core).layer(cors);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to port {port}"));

    tracing::info!("API running on http://localhost:{port}");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}
