//! REST API server module
//!
//! Chunk intake, playlist discovery and artifact serving over HTTP, plus
//! health, event stream and OpenAPI endpoints.

use crate::artifacts::PlaylistLocator;
use crate::{Config, Result, UploadCoordinator};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod auth;
pub mod error_response;
pub mod openapi;
pub mod routes;
pub mod state;

pub use openapi::ApiDoc;
pub use state::AppState;

/// Create the API router with all route definitions
///
/// # Routes
///
/// ## Upload
/// - `POST /upload-chunk` - Store one chunk; the final chunk triggers merge and extraction
///
/// ## Artifacts
/// - `GET /get-m3u8-links` - Links to every extracted playlist
/// - `GET /uploads/:folder/:file` - Serve an extracted artifact (origin-gated if configured)
///
/// ## System
/// - `GET /health` - Health check
/// - `GET /openapi.json` - OpenAPI specification
/// - `GET /swagger-ui` - Interactive Swagger UI documentation (if enabled)
/// - `GET /events` - Server-sent events stream
///
/// `shutdown` ends open event streams so graceful shutdown can finish.
///
/// # Errors
/// The configured public base URL is not usable for links.
pub fn create_router(
    coordinator: UploadCoordinator,
    config: Arc<Config>,
    shutdown: CancellationToken,
) -> Result<Router> {
    let locator = PlaylistLocator::new(
        config.upload_dir().clone(),
        &config.server.api.base_url(),
    )?;
    let state = AppState::new(coordinator, config.clone(), locator, shutdown);

    // Origin gating applies to artifact downloads only
    let allow_list = Arc::new(auth::OriginAllowList::new(
        &config.server.api.allowed_origins,
    ));
    let artifact_routes = Router::new()
        .route("/uploads/:folder/:file", get(routes::serve_artifact))
        .route_layer(middleware::from_fn_with_state(
            allow_list,
            auth::require_allowed_origin,
        ));

    let router = Router::new()
        // Upload
        .route("/upload-chunk", post(routes::upload_chunk))
        // Artifacts
        .route("/get-m3u8-links", get(routes::list_playlist_links))
        .merge(artifact_routes)
        // System
        .route("/health", get(routes::health_check))
        .route("/openapi.json", get(routes::openapi_spec))
        .route("/events", get(routes::event_stream));

    // Swagger UI serves its own copy of the document under a separate path
    let router = if config.server.api.swagger_ui {
        router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
    } else {
        router
    };

    let router = router
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.upload.max_request_bytes))
        .layer(TraceLayer::new_for_http());

    // Apply CORS middleware if enabled in config
    let router = if config.server.api.cors_enabled {
        let cors = build_cors_layer(&config.server.api.cors_origins);
        router.layer(cors)
    } else {
        router
    };

    Ok(router)
}

/// Build a CORS layer based on configured origins
///
/// # Arguments
///
/// * `origins` - List of allowed origins (supports "*" for any origin)
///
/// # Returns
///
/// A configured CorsLayer that allows the specified origins, all methods,
/// and all headers for cross-origin requests.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    // Check if "*" (all origins) is in the list
    let allow_any = origins.iter().any(|o| o == "*");

    if allow_any || origins.is_empty() {
        // Allow all origins (browser uploaders are usually served from elsewhere)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        // Allow specific origins
        let allowed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the API server on the configured bind address.
///
/// Binds a TCP listener and serves the API router until `shutdown` is
/// cancelled, then stops accepting connections and waits for in-flight
/// requests (including any merge they are waiting on) to finish.
///
/// # Example
///
/// ```no_run
/// use hls_drop::{Config, UploadCoordinator};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = Arc::new(Config::default());
/// let coordinator = UploadCoordinator::new(config.clone());
///
/// // Start API server (blocks until shutdown)
/// hls_drop::api::start_api_server(coordinator, config, CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```
pub async fn start_api_server(
    coordinator: UploadCoordinator,
    config: Arc<Config>,
    shutdown: CancellationToken,
) -> Result<()> {
    let bind_address = config.server.api.bind_address;

    tracing::info!(
        address = %bind_address,
        "Starting API server"
    );

    let app = create_router(coordinator, config, shutdown.clone())?;

    // Bind TCP listener to the configured address
    let listener = TcpListener::bind(bind_address)
        .await
        .map_err(crate::error::Error::Io)?;

    tracing::info!(
        address = %bind_address,
        "API server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| crate::error::Error::ApiServerError(e.to_string()))?;

    tracing::info!("API server stopped");
    Ok(())
}
