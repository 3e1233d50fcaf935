//! End-to-end payment order flow through the HTTP router.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use common::app_builder::{
    TestAppBuilder, COURSE_ID, COURSE_PRICE, OTHER_TOKEN, STUDENT_SUBJECT, STUDENT_TOKEN,
};
use payguard_api::checkout::collaborators::mock::{MockOrderStore, MockPaymentProvider};
use payguard_api::protocol::NonceCommit;
use payguard_crypto::verify;

#[tokio::test]
async fn test_valid_request_creates_signed_order() {
    let app = TestAppBuilder::new().build();
    let sealed = app.seal(COURSE_ID, STUDENT_SUBJECT);

    let response = app.send(app.request(&sealed, Some(STUDENT_TOKEN))).await;

    assert_eq!(response.status, StatusCode::CREATED);
    let order = &response.body["order"];
    assert!(order["id"].as_str().is_some_and(|id| id.starts_with("order_")));
    assert_eq!(order["amount"], COURSE_PRICE);
    assert_eq!(order["currency"], "INR");
    assert!(order["receipt"]
        .as_str()
        .is_some_and(|r| r.starts_with("rcpt_")));

    let signature = response
        .header("x-response-signature")
        .expect("response signature");
    let nonce = response.header("x-response-nonce").expect("response nonce");
    assert!(verify(&response.body, nonce, signature, &app.secret));
}

#[tokio::test]
async fn test_order_record_is_persisted() {
    let app = TestAppBuilder::new().build();
    let sealed = app.seal(COURSE_ID, STUDENT_SUBJECT);

    let response = app.send(app.request(&sealed, Some(STUDENT_TOKEN))).await;
    assert_eq!(response.status, StatusCode::CREATED);

    let order_id = response.body["order"]["id"].as_str().expect("order id");
    let record = app.store.get(order_id).expect("record stored");
    assert_eq!(record.subject_id, STUDENT_SUBJECT);
    assert_eq!(record.course_id, COURSE_ID);
    assert_eq!(record.amount, COURSE_PRICE);
    assert_eq!(
        Some(record.receipt_id.as_str()),
        response.body["order"]["receipt"].as_str()
    );
    assert_eq!(record.request_id.len(), 64);
}

#[tokio::test]
async fn test_response_signature_does_not_verify_with_other_nonce() {
    let app = TestAppBuilder::new().build();
    let sealed = app.seal(COURSE_ID, STUDENT_SUBJECT);

    let response = app.send(app.request(&sealed, Some(STUDENT_TOKEN))).await;
    let signature = response.header("x-response-signature").expect("signature");

    assert!(!verify(&response.body, &sealed.nonce, signature, &app.secret));
}

#[tokio::test]
async fn test_missing_token_is_unauthorized_when_identity_required() {
    let app = TestAppBuilder::new().build();
    let sealed = app.seal(COURSE_ID, STUDENT_SUBJECT);

    let response = app.send(app.request(&sealed, None)).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["blocked"], true);
    assert!(!app.service.registries().ledger.has_seen(&sealed.nonce));
}

#[tokio::test]
async fn test_unknown_token_is_unauthorized() {
    let app = TestAppBuilder::new().build();
    let sealed = app.seal(COURSE_ID, STUDENT_SUBJECT);

    let response = app.send(app.request(&sealed, Some("forged"))).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_anonymous_order_when_identity_optional() {
    let app = TestAppBuilder::new().without_identity_requirement().build();
    let sealed = app.seal(COURSE_ID, "guest");

    let response = app.send(app.request(&sealed, None)).await;

    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_intent_for_other_subject_is_rejected() {
    let app = TestAppBuilder::new().build();
    // sealed for student-1, presented with student-2's token
    let sealed = app.seal(COURSE_ID, STUDENT_SUBJECT);

    let response = app.send(app.request(&sealed, Some(OTHER_TOKEN))).await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.body.get("attackType").is_none());
    assert!(!app.service.registries().ledger.has_seen(&sealed.nonce));
}

#[tokio::test]
async fn test_unknown_course_is_bad_request() {
    let app = TestAppBuilder::new().build();
    let sealed = app.seal("no-such-course", STUDENT_SUBJECT);

    let response = app.send(app.request(&sealed, Some(STUDENT_TOKEN))).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_downstream_failure_is_internal_error_and_consumes_nonce() {
    let payments = Arc::new(MockPaymentProvider::failing("gateway unavailable"));
    let app = TestAppBuilder::new().with_payments(payments.clone()).build();
    let sealed = app.seal(COURSE_ID, STUDENT_SUBJECT);

    let response = app.send(app.request(&sealed, Some(STUDENT_TOKEN))).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.body["blocked"], true);

    // same envelope again: the nonce was spent
    payments.set_failure(None);
    let retry = app.send(app.request(&sealed, Some(STUDENT_TOKEN))).await;
    assert_eq!(retry.status, StatusCode::FORBIDDEN);

    // a fresh envelope succeeds
    let fresh = app.seal(COURSE_ID, STUDENT_SUBJECT);
    let response = app.send(app.request(&fresh, Some(STUDENT_TOKEN))).await;
    assert_eq!(response.status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_deferred_commit_allows_retry_after_downstream_failure() {
    let payments = Arc::new(MockPaymentProvider::failing("gateway unavailable"));
    let app = TestAppBuilder::new()
        .with_nonce_commit(NonceCommit::AfterDownstream)
        .with_payments(payments.clone())
        .build();
    let sealed = app.seal(COURSE_ID, STUDENT_SUBJECT);

    let response = app.send(app.request(&sealed, Some(STUDENT_TOKEN))).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!app.service.registries().ledger.has_seen(&sealed.nonce));

    payments.set_failure(None);
    let retry = app.send(app.request(&sealed, Some(STUDENT_TOKEN))).await;
    assert_eq!(retry.status, StatusCode::CREATED);

    let replay = app.send(app.request(&sealed, Some(STUDENT_TOKEN))).await;
    assert_eq!(replay.status, StatusCode::FORBIDDEN);
    assert_eq!(payments.calls(), 2);
}

#[tokio::test]
async fn test_store_failure_is_internal_error() {
    let app = TestAppBuilder::new()
        .with_orders(Arc::new(MockOrderStore::failing()))
        .build();
    let sealed = app.seal(COURSE_ID, STUDENT_SUBJECT);

    let response = app.send(app.request(&sealed, Some(STUDENT_TOKEN))).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test(start_paused = true)]
async fn test_slow_provider_times_out() {
    let payments = Arc::new(MockPaymentProvider::slow(Duration::from_secs(30)));
    let app = TestAppBuilder::new().with_payments(payments).build();
    let sealed = app.seal(COURSE_ID, STUDENT_SUBJECT);

    let response = app.send(app.request(&sealed, Some(STUDENT_TOKEN))).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
}
