//! HTTP wiring shared by the server binary and the integration tests.

pub mod security;

use std::sync::Arc;

use axum::{
    http::{HeaderName, HeaderValue, Method, StatusCode},
    middleware,
    response::IntoResponse,
    routing::get,
    Extension, Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use security::{build_security_headers, security_headers_middleware};

use crate::checkout::http::{RESPONSE_NONCE_HEADER, RESPONSE_SIGNATURE_HEADER};
use crate::checkout::{self, CheckoutService};
use crate::config::{Config, CorsConfig};

pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}

/// CORS layer from the configured origin list. `"*"` allows any origin; an
/// empty list blocks cross-origin requests. Response-signature headers are
/// exposed to browser clients.
#[must_use]
pub fn build_cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins = &config.allowed_origins;
    let allow_origin: AllowOrigin = if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow any origin - not recommended for production");
        AllowOrigin::any()
    } else if origins.is_empty() {
        tracing::info!("CORS allowed origins not configured - cross-origin requests will be blocked");
        AllowOrigin::list(Vec::<HeaderValue>::new())
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        tracing::info!(origins = ?origins, "CORS allowed origins configured");
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([
            HeaderName::from_static(RESPONSE_SIGNATURE_HEADER),
            HeaderName::from_static(RESPONSE_NONCE_HEADER),
        ])
        .allow_origin(allow_origin)
}

/// The full application router: checkout and health routes with CORS,
/// request tracing and (if enabled) security headers.
pub fn build_app(config: &Config, service: Arc<CheckoutService>) -> Router {
    let mut app = Router::new()
        .merge(checkout::router())
        .route("/health", get(health_check))
        .layer(Extension(service))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(&config.cors));

    if config.security_headers.enabled {
        tracing::info!("Security headers enabled");
        app = app
            .layer(middleware::from_fn(security_headers_middleware))
            .layer(Extension(build_security_headers(&config.security_headers)));
    } else {
        tracing::info!("Security headers disabled");
    }

    app
}
