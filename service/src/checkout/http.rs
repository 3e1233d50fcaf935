//! HTTP surface of the checkout flow.
//!
//! `POST /payments/orders` takes a sealed envelope as the JSON body plus the
//! signature headers:
//! - `X-Signature`: hex HMAC-SHA256 over the canonical intent and nonce
//! - `X-Nonce`: must equal the body nonce
//! - `X-Timestamp`: Unix milliseconds, must equal the body timestamp
//! - `Authorization: Bearer <token>` (optional)
//!
//! Malformed input is never rejected by the framework. Every failure goes
//! through the protocol pipeline so it gets the same status mapping and body.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Extension, FromRequest, Request},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::collaborators::OrderHandle;
use super::response::RejectionBody;
use super::service::{CheckoutRequest, CheckoutService};
use crate::protocol::{InboundRequest, RawEnvelope, RejectReason, SignatureHeaders};

/// Request bodies above this size are treated as empty.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const NONCE_HEADER: &str = "x-nonce";
pub const TIMESTAMP_HEADER: &str = "x-timestamp";
pub const RESPONSE_SIGNATURE_HEADER: &str = "x-response-signature";
pub const RESPONSE_NONCE_HEADER: &str = "x-response-nonce";

const UNKNOWN_ORIGIN: &str = "unknown";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedResponse {
    pub order: OrderHandle,
}

#[must_use]
pub fn router() -> Router {
    Router::new().route("/payments/orders", post(create_order))
}

/// A payment request pulled apart into what the protocol needs.
///
/// Extraction is infallible: missing or unparseable parts become `None`.
pub struct SealedPaymentRequest(pub CheckoutRequest);

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

impl<S: Send + Sync> FromRequest<S> for SealedPaymentRequest {
    type Rejection = Infallible;

    async fn from_request(req: Request, _state: &S) -> Result<Self, Self::Rejection> {
        let origin = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map_or_else(|| UNKNOWN_ORIGIN.to_string(), |ci| ci.0.ip().to_string());

        let (parts, body) = req.into_parts();
        let headers = SignatureHeaders {
            signature: header_string(&parts.headers, SIGNATURE_HEADER),
            nonce: header_string(&parts.headers, NONCE_HEADER),
            timestamp: header_string(&parts.headers, TIMESTAMP_HEADER),
        };

        let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
            Ok(bytes) => serde_json::from_slice::<RawEnvelope>(&bytes).unwrap_or_default(),
            Err(_) => RawEnvelope::default(),
        };

        Ok(Self(CheckoutRequest {
            origin,
            bearer: bearer_token(&parts.headers),
            inbound: InboundRequest { body, headers },
        }))
    }
}

fn rejection_response(reason: RejectReason) -> Response {
    (reason.status(), Json(RejectionBody::for_reason(reason))).into_response()
}

async fn create_order(
    Extension(service): Extension<Arc<CheckoutService>>,
    SealedPaymentRequest(request): SealedPaymentRequest,
) -> Response {
    let order = match service.checkout(request).await {
        Ok(order) => order,
        Err(rejection) => return rejection_response(rejection.reason),
    };

    let body = OrderCreatedResponse { order };
    let signature = match service.sign_response(&body) {
        Ok(signature) => signature,
        Err(e) => {
            tracing::error!(error = %e, "Failed to sign response");
            return rejection_response(RejectReason::DownstreamFailure);
        }
    };

    let mut response = (StatusCode::CREATED, Json(body)).into_response();
    let headers = response.headers_mut();
    if let (Ok(sig), Ok(nonce)) = (
        HeaderValue::from_str(&signature.signature),
        HeaderValue::from_str(&signature.nonce),
    ) {
        headers.insert(RESPONSE_SIGNATURE_HEADER, sig);
        headers.insert(RESPONSE_NONCE_HEADER, nonce);
    }
    response
}
