//! Server mode
//!
//! Prepares storage and the workflow engine, then serves the REST API
//! until Ctrl+C.

use actix_cors::Cors;
use actix_web::{App, HttpServer, http::Method, middleware::Compress, web};
use anyhow::Result;
use tracing::{info, warn};

use crate::api::middleware::RequestIdMiddleware;
use crate::api::tenancy::TENANT_HEADER;
use crate::api::{AppState, api_routes};
use crate::config::get_config;
use crate::runtime::lifetime;

/// CORS：只放行配置的来源
pub fn build_cors(allowed_origin: &str) -> Cors {
    let mut cors = Cors::default()
        .allowed_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allowed_headers(["Content-Type", "Authorization", TENANT_HEADER, "X-API-Key"])
        .max_age(3600);
    if allowed_origin == "*" {
        cors = cors.allow_any_origin();
    } else if !allowed_origin.is_empty() {
        cors = cors.allowed_origin(allowed_origin);
    }
    cors
}

/// Run the HTTP server
///
/// **Note**: Logging system must be initialized before calling this function
pub async fn run_server() -> Result<()> {
    let startup = lifetime::startup::prepare_server_startup()
        .await
        .map_err(|e| {
            tracing::error!("Server startup failed: {}", e);
            e
        })?;

    let config = get_config();
    let state = web::Data::new(AppState::new(
        startup.storage.clone(),
        startup.engine.clone(),
        &config,
    ));
    if state.admin_api_key.is_empty() {
        warn!("ADMIN_API_KEY is not set: API runs in development mode without authentication");
    }

    let allowed_origin = config.server.allowed_origin.clone();
    let cpu_count = config.server.cpu_count.clamp(1, 32);
    info!("Using {} CPU cores for the server", cpu_count);

    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let server = HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&allowed_origin))
            .wrap(RequestIdMiddleware)
            .wrap(Compress::default())
            .app_data(state.clone())
            .service(api_routes())
    })
    .keep_alive(std::time::Duration::from_secs(30))
    .workers(cpu_count)
    .disable_signals()
    .bind(&bind_address)?
    .run();
    warn!("Starting server at http://{}", bind_address);

    let server_handle = server.handle();
    tokio::select! {
        res = server => {
            res?;
        }
        _ = lifetime::shutdown::listen_for_shutdown() => {
            server_handle.stop(true).await;
        }
    }

    lifetime::shutdown::perform_shutdown(startup.engine_handle).await;
    info!("Server stopped");
    Ok(())
}
