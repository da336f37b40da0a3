pub mod api;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;

use crate::api::handlers;
use crate::api::middleware::{metrics::metrics_middleware, request_id::request_id_middleware};
use crate::api::middleware::request_id::request_id_of;
use crate::config::UploadConfig;
use crate::services::ingest::IngestService;
use crate::services::storage::LocalStorage;
use axum::{
    Json, Router,
    http::{HeaderValue, Method, header},
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::upload::upload_file,
        handlers::health::health_check,
    ),
    components(
        schemas(
            handlers::upload::UploadForm,
            handlers::health::HealthResponse,
            models::UploadResult,
            models::ErrorEnvelope,
        )
    ),
    tags(
        (name = "files", description = "CSV upload endpoint"),
        (name = "system", description = "Service status")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub ingest: Arc<IngestService>,
    pub config: UploadConfig,
}

impl AppState {
    pub fn new(storage: LocalStorage, config: UploadConfig) -> Self {
        Self {
            ingest: Arc::new(IngestService::new(storage, config.clone())),
            config,
        }
    }
}

fn cors_layer(config: &UploadConfig) -> CorsLayer {
    let origins = if config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            config
                .allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    let upload = post(handlers::upload::upload_file).fallback(handlers::upload::method_not_allowed);

    Router::new()
        .route("/v1/files/", upload.clone())
        .route("/v1/files", upload)
        .route("/health", get(handlers::health::health_check))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .fallback(handlers::upload::not_found)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = %request_id_of(request),
                    )
                })
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    tracing::info!("📥 {} {}", request.method(), request.uri());
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            "📤 Finished in {:?} with status {}",
                            latency,
                            response.status()
                        );
                    },
                ),
        )
        .layer(from_fn(request_id_middleware))
        .layer(cors)
        .with_state(state)
}
