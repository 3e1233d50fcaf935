//! Checkout orchestration: identity → rate limit → validation pipeline →
//! suspicious-activity check → downstream order creation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use payguard_crypto::{random_hex, sign, SignError, SigningSecret};
use serde::Serialize;

use super::collaborators::{
    CollaboratorError, CourseCatalog, Identity, IdentityProvider, InMemoryOrderStore,
    OrderHandle, OrderRecord, OrderStore, PaymentProvider, SandboxPaymentProvider,
    StaticCatalog, StaticTokenIdentityProvider,
};
use crate::config::{CheckoutConfig, Config, ConfigError};
use crate::protocol::{
    ActivityKey, ActivityTracker, ActivityVerdict, Clock, FixedWindowLimiter, InboundRequest, NonceCommit,
    NonceLedger, RateKey, Registries, RejectReason, Rejection, RequestValidator, Stage,
    ValidatedRequest,
};

/// Bytes of randomness in a response nonce.
const RESPONSE_NONCE_BYTES: usize = 16;

/// The four external collaborators.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub catalog: Arc<dyn CourseCatalog>,
    pub payments: Arc<dyn PaymentProvider>,
    pub orders: Arc<dyn OrderStore>,
}

impl Collaborators {
    /// Development adapters driven entirely by configuration.
    #[must_use]
    pub fn in_memory(config: &CheckoutConfig) -> Self {
        Self {
            identity: Arc::new(StaticTokenIdentityProvider::from_config(config)),
            catalog: Arc::new(StaticCatalog::from_config(config)),
            payments: Arc::new(SandboxPaymentProvider),
            orders: Arc::new(InMemoryOrderStore::default()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub privileged_role: String,
    pub nonce_commit: NonceCommit,
    pub require_identity: bool,
    pub downstream_timeout: Duration,
}

/// One payment request as seen by the service.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// Network origin of the caller (remote IP).
    pub origin: String,
    /// Bearer token from `Authorization`, if any.
    pub bearer: Option<String>,
    pub inbound: InboundRequest,
}

/// Signature headers attached to a successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSignature {
    pub signature: String,
    pub nonce: String,
}

pub struct CheckoutService {
    validator: RequestValidator,
    registries: Registries,
    clock: Arc<dyn Clock>,
    collaborators: Collaborators,
    secret: SigningSecret,
    settings: CheckoutSettings,
}

impl CheckoutService {
    /// Build the service and its registries from configuration.
    ///
    /// # Errors
    /// Returns [`ConfigError::Validation`] if the encryption key is invalid.
    pub fn from_config(
        config: &Config,
        clock: Arc<dyn Clock>,
        collaborators: Collaborators,
    ) -> Result<Self, ConfigError> {
        let protocol = &config.protocol;
        let key = protocol
            .encryption_key()
            .map_err(|e| ConfigError::Validation(format!("protocol.encryption_key: {e}")))?;
        let secret = protocol.signing_secret();

        let registries = Registries {
            ledger: Arc::new(NonceLedger::new(protocol.nonce_retention_ms)),
            limiter: Arc::new(FixedWindowLimiter::new(
                config.rate_limit.max_requests,
                config.rate_limit.window_ms,
            )),
            tracker: Arc::new(ActivityTracker::new(
                config.suspicious_activity.threshold,
                config.suspicious_activity.window_ms,
            )),
        };

        let validator = RequestValidator::new(
            key,
            secret.clone(),
            Arc::clone(&registries.ledger),
            Arc::clone(&clock),
            protocol.freshness_tolerance_ms,
        );

        Ok(Self {
            validator,
            registries,
            clock,
            collaborators,
            secret,
            settings: CheckoutSettings {
                currency: config.checkout.currency.clone(),
                privileged_role: config.checkout.privileged_role.clone(),
                nonce_commit: protocol.nonce_commit,
                require_identity: protocol.require_identity,
                downstream_timeout: Duration::from_millis(protocol.downstream_timeout_ms),
            },
        })
    }

    #[must_use]
    pub const fn registries(&self) -> &Registries {
        &self.registries
    }

    /// Authenticate, validate and execute one payment request.
    ///
    /// # Errors
    /// Returns a [`Rejection`] naming the failed check and the last stage
    /// that passed. Every rejection is logged here.
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<OrderHandle, Rejection> {
        let identity = self.resolve_identity(request.bearer.as_deref()).await;
        let resolved = identity.as_ref().map(Option::as_ref).map_err(|rejection| *rejection);
        let result = self.run(&request, resolved).await;
        if let Err(rejection) = &result {
            let subject = resolved.ok().flatten().map(|i| i.subject_id.as_str());
            log_rejection(*rejection, &request.origin, subject);
        }
        result
    }

    async fn run(
        &self,
        request: &CheckoutRequest,
        identity: Result<Option<&Identity>, Rejection>,
    ) -> Result<OrderHandle, Rejection> {
        // Callers whose identity failed are charged to the anonymous budget
        // of their origin before being turned away.
        let resolved = identity.ok().flatten();
        let privileged = resolved.is_some_and(|i| i.role == self.settings.privileged_role);

        if !privileged {
            let key = RateKey::new(resolved.map(|i| i.subject_id.as_str()), &request.origin);
            if !self.registries.limiter.allow(&key, self.clock.now_ms()) {
                return Err(Rejection::new(RejectReason::RateLimited, Stage::Received));
            }
        }

        let subject = identity?.map(|i| i.subject_id.as_str());
        let validated = self.validator.validate(&request.inbound, subject)?;

        let activity_key = ActivityKey::for_request(subject, &request.origin);
        let verdict = self
            .registries
            .tracker
            .record_and_check(&activity_key, self.clock.now_ms());
        if verdict == ActivityVerdict::Blocked {
            self.release_reservation(&validated.nonce);
            return Err(Rejection::new(
                RejectReason::SuspiciousActivityBlocked,
                Stage::Committed,
            ));
        }

        match self.create_order(&validated).await {
            Ok(order) => {
                tracing::info!(
                    order_id = %order.id,
                    receipt = %order.receipt,
                    subject = %validated.intent.subject_id,
                    course_id = %validated.intent.course_id,
                    "Payment order created"
                );
                Ok(order)
            }
            Err(reason) => {
                self.release_reservation(&validated.nonce);
                Err(Rejection::new(reason, Stage::Committed))
            }
        }
    }

    async fn resolve_identity(&self, bearer: Option<&str>) -> Result<Option<Identity>, Rejection> {
        let identity_rejection = Rejection::new(RejectReason::IdentityMismatch, Stage::Received);
        match bearer {
            Some(token) => self
                .collaborators
                .identity
                .verify_token(token)
                .await
                .map(Some)
                .map_err(|_| identity_rejection),
            None if self.settings.require_identity => Err(identity_rejection),
            None => Ok(None),
        }
    }

    async fn create_order(&self, validated: &ValidatedRequest) -> Result<OrderHandle, RejectReason> {
        let downstream = async {
            let intent = &validated.intent;
            let amount = self.collaborators.catalog.price_of(&intent.course_id).await?;
            let receipt_id = format!("rcpt_{}", uuid::Uuid::new_v4().simple());
            let order = self
                .collaborators
                .payments
                .create_order(amount, &self.settings.currency, &receipt_id)
                .await?;

            let record = OrderRecord {
                order_id: order.id.clone(),
                receipt_id,
                request_id: intent.request_id.clone(),
                subject_id: intent.subject_id.clone(),
                course_id: intent.course_id.clone(),
                amount,
                currency: self.settings.currency.clone(),
                created_at: Utc::now(),
            };
            self.collaborators.orders.create_order_record(&record).await?;
            Ok::<_, CollaboratorError>(order)
        };

        match tokio::time::timeout(self.settings.downstream_timeout, downstream).await {
            Ok(Ok(order)) => Ok(order),
            Ok(Err(CollaboratorError::CourseNotFound(course_id))) => {
                tracing::warn!(course_id = %course_id, "Order for unknown course");
                Err(RejectReason::MalformedRequest)
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Downstream order creation failed");
                Err(RejectReason::DownstreamFailure)
            }
            Err(_) => {
                tracing::error!(
                    timeout = ?self.settings.downstream_timeout,
                    "Downstream order creation timed out"
                );
                Err(RejectReason::DownstreamFailure)
            }
        }
    }

    /// Under deferred commit, give the nonce back after a post-verification failure.
    fn release_reservation(&self, nonce: &str) {
        if self.settings.nonce_commit == NonceCommit::AfterDownstream
            && self.registries.ledger.release(nonce)
        {
            tracing::debug!("Released nonce reservation");
        }
    }

    /// Sign a response body under a fresh nonce.
    ///
    /// # Errors
    /// Returns [`SignError`] if the body cannot be canonicalized.
    pub fn sign_response<T: Serialize>(&self, body: &T) -> Result<ResponseSignature, SignError> {
        let nonce = random_hex(RESPONSE_NONCE_BYTES);
        let signature = sign(body, &nonce, &self.secret)?;
        Ok(ResponseSignature { signature, nonce })
    }
}

fn log_rejection(rejection: Rejection, origin: &str, subject: Option<&str>) {
    let subject = subject.unwrap_or(crate::protocol::ANONYMOUS_SUBJECT);
    match rejection.reason.attack_type() {
        Some(attack_type) => tracing::warn!(
            reason = rejection.reason.as_str(),
            stage = %rejection.stage,
            origin,
            subject,
            attack_type,
            reported = true,
            "Payment request blocked"
        ),
        None => tracing::warn!(
            reason = rejection.reason.as_str(),
            stage = %rejection.stage,
            origin,
            subject,
            "Payment request rejected"
        ),
    }
}
