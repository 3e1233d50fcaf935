//! Security headers middleware.
//!
//! Payment responses carry order details and signatures, so besides the usual
//! protective headers every response is marked `Cache-Control: no-store`.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{
        header::{
            CACHE_CONTROL, CONTENT_SECURITY_POLICY, REFERRER_POLICY, STRICT_TRANSPORT_SECURITY,
            X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
        },
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::Response,
    Extension,
};

use crate::config::SecurityHeadersConfig;

/// Build the header set once at startup; shared across requests via `Extension`.
#[must_use]
pub fn build_security_headers(config: &SecurityHeadersConfig) -> Arc<HeaderMap> {
    let mut headers = HeaderMap::new();

    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    if let Ok(value) = HeaderValue::from_str(&config.frame_options) {
        headers.insert(X_FRAME_OPTIONS, value);
    }

    if let Ok(value) = HeaderValue::from_str(&config.content_security_policy) {
        headers.insert(CONTENT_SECURITY_POLICY, value);
    }

    if let Ok(value) = HeaderValue::from_str(&config.referrer_policy) {
        headers.insert(REFERRER_POLICY, value);
    }

    // HTTPS deployments only
    if config.hsts_enabled {
        let hsts_value = if config.hsts_include_subdomains {
            format!("max-age={}; includeSubDomains", config.hsts_max_age)
        } else {
            format!("max-age={}", config.hsts_max_age)
        };
        if let Ok(value) = HeaderValue::from_str(&hsts_value) {
            headers.insert(STRICT_TRANSPORT_SECURITY, value);
        }
    }

    Arc::new(headers)
}

/// Copy the prebuilt headers onto every response. Add as the outermost layer.
pub async fn security_headers_middleware(
    Extension(headers): Extension<Arc<HeaderMap>>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    let response_headers = response.headers_mut();
    for (k, v) in headers.iter() {
        response_headers.insert(k.clone(), v.clone());
    }
    response
}
