//! Checkout: the payment-order endpoint and its collaborators.

pub mod collaborators;
pub mod http;
pub mod response;
pub mod service;

pub use collaborators::{
    CollaboratorError, CourseCatalog, Identity, IdentityProvider, InMemoryOrderStore,
    OrderHandle, OrderRecord, OrderStore, PaymentProvider, SandboxPaymentProvider,
    StaticCatalog, StaticTokenIdentityProvider,
};
pub use http::{router, OrderCreatedResponse};
pub use response::RejectionBody;
pub use service::{CheckoutRequest, CheckoutService, CheckoutSettings, Collaborators};
