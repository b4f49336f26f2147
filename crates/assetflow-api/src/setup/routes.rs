//! Route configuration and setup

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use assetflow_infra::{request_id_middleware, RequestId};

use crate::error::error_details_middleware;
use crate::handlers::{assets, files, health, storage};
use crate::state::AppState;

/// JSON request bodies only; media never arrives in a request body.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

pub fn setup_routes(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::HEAD, Method::POST, Method::DELETE])
        .allow_headers(Any)
        .expose_headers(Any);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .map(|id| id.0.as_str())
            .unwrap_or("-");
        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    });

    let api_routes = Router::new()
        .route(
            "/assets",
            get(assets::list_assets).post(assets::create_asset),
        )
        .route(
            "/assets/{id}",
            get(assets::get_asset).delete(assets::release_asset),
        )
        .route("/assets/{id}/replace", post(assets::replace_asset));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/", post(storage::store_media))
        .route(
            "/{name}",
            get(files::serve_file).delete(storage::delete_stored),
        )
        .nest("/api/v0", api_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            error_details_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
        .layer(cors)
        .layer(trace)
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}
