//! seal-request: build a sealed payment request for manual testing.
//!
//! Prints the JSON body and the signature headers a client would send to
//! `POST /payments/orders`.

#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]
#![allow(clippy::print_stdout)]

use std::collections::BTreeMap;

use clap::Parser;
use payguard_crypto::{seal_order, EncryptionKey, OrderIntent, SigningSecret};
use serde::Serialize;

/// Seal an order intent into an encrypted, signed payment request
#[derive(Parser, Debug)]
#[command(name = "seal-request")]
#[command(about = "Build a sealed payment request body and signature headers")]
struct Args {
    /// Course to order
    #[arg(short, long)]
    course: String,

    /// Subject id placed in the intent (must match the bearer token's subject)
    #[arg(short, long)]
    subject: String,

    /// AES-256 key, 64 hex characters
    #[arg(long, env = "PAYGUARD_PROTOCOL__ENCRYPTION_KEY", hide_env_values = true)]
    key: String,

    /// HMAC signing secret
    #[arg(long, env = "PAYGUARD_PROTOCOL__SIGNING_SECRET", hide_env_values = true)]
    secret: String,

    /// Shift the request timestamp by this many milliseconds (negative for the past)
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    offset_ms: i64,
}

#[derive(Serialize)]
struct Output {
    body: payguard_crypto::SecureEnvelope,
    headers: BTreeMap<&'static str, String>,
}

fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();

    let key = EncryptionKey::from_hex(&args.key)?;
    let secret = SigningSecret::new(args.secret.as_bytes());
    let now_ms = chrono::Utc::now().timestamp_millis() + args.offset_ms;

    let intent = OrderIntent::new(&args.course, &args.subject, now_ms);
    let sealed = seal_order(&intent, &key, &secret, now_ms)?;

    let headers = BTreeMap::from([
        ("X-Signature", sealed.signature),
        ("X-Nonce", sealed.nonce),
        ("X-Timestamp", sealed.timestamp.to_string()),
    ]);
    let output = Output {
        body: sealed.envelope,
        headers,
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
