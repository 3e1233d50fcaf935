//! Test app builder that mirrors main.rs wiring with injectable deps/mocks.
//!
//! The router comes from [`payguard_api::http::build_app`], the same function
//! the server uses, so layer ordering matches production. Time is driven by a
//! [`MockClock`] so freshness and window boundaries are deterministic.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header::AUTHORIZATION, HeaderMap, Method, Request, StatusCode},
    Router,
};
use payguard_api::checkout::{
    CheckoutService, Collaborators, InMemoryOrderStore, OrderStore, PaymentProvider,
};
use payguard_api::config::{Config, CoursePrice, DevToken};
use payguard_api::protocol::clock::mock::MockClock;
use payguard_api::protocol::NonceCommit;
use payguard_crypto::{seal_order, EncryptionKey, OrderIntent, SealedRequest, SigningSecret};
use tower::ServiceExt;

pub const NOW: i64 = 1_700_000_000_000;
pub const TEST_KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";
pub const TEST_SECRET: &str = "integration-signing-secret";

pub const COURSE_ID: &str = "rust-101";
pub const COURSE_PRICE: u64 = 49_900;

pub const STUDENT_TOKEN: &str = "student-token";
pub const STUDENT_SUBJECT: &str = "student-1";
pub const OTHER_TOKEN: &str = "other-token";
pub const OTHER_SUBJECT: &str = "student-2";
pub const ADMIN_TOKEN: &str = "admin-token";
pub const ADMIN_SUBJECT: &str = "admin-1";

pub const ORDERS_PATH: &str = "/payments/orders";

/// Builder for test applications that mirrors main.rs wiring.
pub struct TestAppBuilder {
    config: Config,
    payments: Option<Arc<dyn PaymentProvider>>,
    orders: Option<Arc<dyn OrderStore>>,
}

impl Default for TestAppBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppBuilder {
    /// Default protocol settings with a known key, secret, course and tokens.
    pub fn new() -> Self {
        let mut config = Config::default();
        config.protocol.encryption_key = TEST_KEY_HEX.to_string();
        config.protocol.signing_secret = TEST_SECRET.to_string();
        config.protocol.downstream_timeout_ms = 200;
        config.checkout.courses = vec![CoursePrice {
            id: COURSE_ID.to_string(),
            amount: COURSE_PRICE,
        }];
        config.checkout.dev_tokens = vec![
            token(STUDENT_TOKEN, STUDENT_SUBJECT, "student"),
            token(OTHER_TOKEN, OTHER_SUBJECT, "student"),
            token(ADMIN_TOKEN, ADMIN_SUBJECT, "admin"),
        ];
        Self {
            config,
            payments: None,
            orders: None,
        }
    }

    #[must_use]
    pub fn with_nonce_commit(mut self, commit: NonceCommit) -> Self {
        self.config.protocol.nonce_commit = commit;
        self
    }

    #[must_use]
    pub fn with_rate_limit(mut self, max_requests: u32, window_ms: u64) -> Self {
        self.config.rate_limit.max_requests = max_requests;
        self.config.rate_limit.window_ms = window_ms;
        self
    }

    #[must_use]
    pub fn with_activity_threshold(mut self, threshold: usize) -> Self {
        self.config.suspicious_activity.threshold = threshold;
        self
    }

    #[must_use]
    pub fn without_identity_requirement(mut self) -> Self {
        self.config.protocol.require_identity = false;
        self
    }

    #[must_use]
    pub fn with_cors(mut self, origins: &[&str]) -> Self {
        self.config.cors.allowed_origins = origins.iter().map(|s| (*s).to_string()).collect();
        self
    }

    #[must_use]
    pub fn without_security_headers(mut self) -> Self {
        self.config.security_headers.enabled = false;
        self
    }

    #[must_use]
    pub fn with_payments(mut self, payments: Arc<dyn PaymentProvider>) -> Self {
        self.payments = Some(payments);
        self
    }

    #[must_use]
    pub fn with_orders(mut self, orders: Arc<dyn OrderStore>) -> Self {
        self.orders = Some(orders);
        self
    }

    /// # Panics
    ///
    /// Panics if the test configuration is invalid.
    #[allow(clippy::expect_used)]
    pub fn build(self) -> TestApp {
        self.config.validate().expect("test config should be valid");

        let clock = MockClock::new(NOW);
        let store = Arc::new(InMemoryOrderStore::default());
        let mut collaborators = Collaborators::in_memory(&self.config.checkout);
        collaborators.orders = self
            .orders
            .unwrap_or_else(|| Arc::clone(&store) as Arc<dyn OrderStore>);
        if let Some(payments) = self.payments {
            collaborators.payments = payments;
        }

        let service = Arc::new(
            CheckoutService::from_config(&self.config, Arc::new(clock.clone()), collaborators)
                .expect("service should build"),
        );
        let router = payguard_api::http::build_app(&self.config, Arc::clone(&service));

        TestApp {
            router,
            service,
            clock,
            store,
            key: EncryptionKey::from_hex(TEST_KEY_HEX).expect("test key"),
            secret: SigningSecret::new(TEST_SECRET.as_bytes()),
        }
    }
}

fn token(token: &str, subject: &str, role: &str) -> DevToken {
    DevToken {
        token: token.to_string(),
        subject_id: subject.to_string(),
        role: role.to_string(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub service: Arc<CheckoutService>,
    pub clock: MockClock,
    /// Default order store; unused when a custom store was injected.
    pub store: Arc<InMemoryOrderStore>,
    pub key: EncryptionKey,
    pub secret: SigningSecret,
}

/// Decoded response: status, headers and JSON body (`Null` when empty).
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestApp {
    /// Seal an order stamped with the current mock time.
    pub fn seal(&self, course: &str, subject: &str) -> SealedRequest {
        self.seal_at(course, subject, self.clock_now())
    }

    /// # Panics
    ///
    /// Panics if sealing fails.
    #[allow(clippy::expect_used)]
    pub fn seal_at(&self, course: &str, subject: &str, timestamp: i64) -> SealedRequest {
        let intent = OrderIntent::new(course, subject, timestamp);
        seal_order(&intent, &self.key, &self.secret, timestamp).expect("seal")
    }

    pub fn clock_now(&self) -> i64 {
        use payguard_api::protocol::Clock;
        self.clock.now_ms()
    }

    /// Build `POST /payments/orders` from a sealed request.
    pub fn request(&self, sealed: &SealedRequest, bearer: Option<&str>) -> Request<Body> {
        let body = serde_json::to_string(&sealed.envelope).unwrap_or_default();
        raw_request(
            &body,
            &[
                ("X-Signature", sealed.signature.as_str()),
                ("X-Nonce", sealed.nonce.as_str()),
                ("X-Timestamp", &sealed.timestamp.to_string()),
            ],
            bearer,
        )
    }

    /// Same as [`Self::request`] but arriving from `origin`.
    pub fn request_from(
        &self,
        sealed: &SealedRequest,
        bearer: Option<&str>,
        origin: [u8; 4],
    ) -> Request<Body> {
        let mut req = self.request(sealed, bearer);
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from((origin, 40_000))));
        req
    }

    /// # Panics
    ///
    /// Panics if the router fails or the body is not JSON.
    #[allow(clippy::expect_used)]
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("response");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// Build a `POST /payments/orders` request from raw parts.
///
/// # Panics
///
/// Panics if a header value is invalid.
#[allow(clippy::expect_used)]
pub fn raw_request(body: &str, headers: &[(&str, &str)], bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(ORDERS_PATH)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    if let Some(token) = bearer {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("request")
}
