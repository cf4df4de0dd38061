pub mod error;
pub mod routes;
pub mod state;

use acgen_core::config::Config;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Generation
        .route(
            "/generate/acceptance-criteria",
            post(routes::generate::acceptance_criteria),
        )
        .route(
            "/generate/test-scenarios",
            post(routes::generate::test_scenarios),
        )
        .route(
            "/generate/full-pipeline",
            post(routes::generate::full_pipeline),
        )
        .route("/generate/providers", get(routes::generate::providers))
        // Jira
        .route("/jira/publish", post(routes::jira::publish))
        .route("/jira/story/{issue_id}", get(routes::jira::get_story))
        .route("/jira/search", get(routes::jira::search))
        .route("/jira/validate", get(routes::jira::validate))
        .route("/jira/custom-fields", get(routes::jira::custom_fields))
        .route("/jira/webhook", post(routes::jira::webhook))
        // System
        .route("/health", get(routes::system::health))
        .route("/history", get(routes::system::history))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the HTTP server on `config.server.host:port`.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    serve_on(config, listener).await
}

/// Start the server on a pre-bound listener.
///
/// Unlike `serve`, this accepts a `TcpListener` that was already bound so the
/// caller can read the actual port before starting (useful when `port = 0` and
/// the OS picks a free port).
pub async fn serve_on(config: Config, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    for warning in config.validate() {
        tracing::warn!(level = ?warning.level, "{}", warning.message);
    }
    let app = build_router(AppState::from_config(&config)?);
    let local = listener.local_addr()?;

    tracing::info!(
        provider = %config.llm.provider,
        jira = %config.jira.url,
        "acgen server listening on http://{local}"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
