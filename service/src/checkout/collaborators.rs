//! External collaborators of the checkout flow.
//!
//! Identity, catalog, payment provider and order store are traits so the
//! handler can be exercised with mocks. The in-memory adapters built from
//! [`CheckoutConfig`] let the binary run end to end without any external
//! service.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::config::CheckoutConfig;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: String,
    pub role: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum CollaboratorError {
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("course not found: {0}")]
    CourseNotFound(String),
    #[error("payment provider error: {0}")]
    Provider(String),
    #[error("order store error: {0}")]
    Store(String),
}

/// Order as created by the payment provider. Returned to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHandle {
    pub id: String,
    /// Minor currency units.
    pub amount: u64,
    pub currency: String,
    pub receipt: String,
    pub status: String,
}

/// Metadata persisted for every created order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: String,
    pub receipt_id: String,
    pub request_id: String,
    pub subject_id: String,
    pub course_id: String,
    pub amount: u64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify_token(&self, bearer: &str) -> Result<Identity, CollaboratorError>;
}

#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// Price of `course_id` in minor currency units.
    async fn price_of(&self, course_id: &str) -> Result<u64, CollaboratorError>;
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_order(
        &self,
        amount: u64,
        currency: &str,
        receipt_id: &str,
    ) -> Result<OrderHandle, CollaboratorError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order_record(&self, record: &OrderRecord) -> Result<(), CollaboratorError>;
}

// ─── In-memory adapters ─────────────────────────────────────────────────────

/// Identity provider backed by a fixed token table.
#[derive(Debug, Default)]
pub struct StaticTokenIdentityProvider {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenIdentityProvider {
    #[must_use]
    pub fn from_config(config: &CheckoutConfig) -> Self {
        let tokens = config
            .dev_tokens
            .iter()
            .map(|t| {
                (
                    t.token.clone(),
                    Identity {
                        subject_id: t.subject_id.clone(),
                        role: t.role.clone(),
                    },
                )
            })
            .collect();
        Self { tokens }
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenIdentityProvider {
    async fn verify_token(&self, bearer: &str) -> Result<Identity, CollaboratorError> {
        self.tokens
            .get(bearer)
            .cloned()
            .ok_or(CollaboratorError::InvalidToken)
    }
}

#[derive(Debug, Default)]
pub struct StaticCatalog {
    prices: HashMap<String, u64>,
}

impl StaticCatalog {
    #[must_use]
    pub fn from_config(config: &CheckoutConfig) -> Self {
        let prices = config
            .courses
            .iter()
            .map(|c| (c.id.clone(), c.amount))
            .collect();
        Self { prices }
    }
}

#[async_trait]
impl CourseCatalog for StaticCatalog {
    async fn price_of(&self, course_id: &str) -> Result<u64, CollaboratorError> {
        self.prices
            .get(course_id)
            .copied()
            .ok_or_else(|| CollaboratorError::CourseNotFound(course_id.to_string()))
    }
}

/// Payment provider that creates orders locally with `order_<uuid>` ids.
#[derive(Debug, Default)]
pub struct SandboxPaymentProvider;

#[async_trait]
impl PaymentProvider for SandboxPaymentProvider {
    async fn create_order(
        &self,
        amount: u64,
        currency: &str,
        receipt_id: &str,
    ) -> Result<OrderHandle, CollaboratorError> {
        Ok(OrderHandle {
            id: format!("order_{}", uuid::Uuid::new_v4().simple()),
            amount,
            currency: currency.to_string(),
            receipt: receipt_id.to_string(),
            status: "created".to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    records: DashMap<String, OrderRecord>,
}

impl InMemoryOrderStore {
    #[must_use]
    pub fn get(&self, order_id: &str) -> Option<OrderRecord> {
        self.records.get(order_id).map(|r| r.clone())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order_record(&self, record: &OrderRecord) -> Result<(), CollaboratorError> {
        self.records
            .insert(record.order_id.clone(), record.clone());
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[allow(clippy::expect_used)]
pub mod mock {
    //! Mock collaborators for checkout handler tests.

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::{
        async_trait, CollaboratorError, OrderHandle, OrderRecord, OrderStore, PaymentProvider,
    };

    /// Payment provider with a configurable failure, delay and call count.
    #[derive(Debug, Default)]
    pub struct MockPaymentProvider {
        pub failure: Mutex<Option<CollaboratorError>>,
        pub delay: Mutex<Option<Duration>>,
        calls: AtomicUsize,
    }

    impl MockPaymentProvider {
        #[must_use]
        pub fn failing(message: &str) -> Self {
            let mock = Self::default();
            mock.set_failure(Some(CollaboratorError::Provider(message.to_string())));
            mock
        }

        #[must_use]
        pub fn slow(delay: Duration) -> Self {
            let mock = Self::default();
            *mock.delay.lock().expect("lock poisoned") = Some(delay);
            mock
        }

        /// # Panics
        ///
        /// Panics if the internal mutex is poisoned.
        pub fn set_failure(&self, failure: Option<CollaboratorError>) {
            *self.failure.lock().expect("lock poisoned") = failure;
        }

        #[must_use]
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PaymentProvider for MockPaymentProvider {
        async fn create_order(
            &self,
            amount: u64,
            currency: &str,
            receipt_id: &str,
        ) -> Result<OrderHandle, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock().expect("lock poisoned");
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if let Some(err) = self.failure.lock().expect("lock poisoned").clone() {
                return Err(err);
            }
            Ok(OrderHandle {
                id: format!("order_mock_{receipt_id}"),
                amount,
                currency: currency.to_string(),
                receipt: receipt_id.to_string(),
                status: "created".to_string(),
            })
        }
    }

    /// Order store that records every write and can be told to fail.
    #[derive(Debug, Default)]
    pub struct MockOrderStore {
        pub records: Mutex<Vec<OrderRecord>>,
        pub fail: Mutex<bool>,
    }

    impl MockOrderStore {
        #[must_use]
        pub fn failing() -> Self {
            let mock = Self::default();
            *mock.fail.lock().expect("lock poisoned") = true;
            mock
        }

        #[must_use]
        pub fn records(&self) -> Vec<OrderRecord> {
            self.records.lock().expect("lock poisoned").clone()
        }
    }

    #[async_trait]
    impl OrderStore for MockOrderStore {
        async fn create_order_record(&self, record: &OrderRecord) -> Result<(), CollaboratorError> {
            if *self.fail.lock().expect("lock poisoned") {
                return Err(CollaboratorError::Store("write rejected".to_string()));
            }
            self.records
                .lock()
                .expect("lock poisoned")
                .push(record.clone());
            Ok(())
        }
    }
}
