//! Common test utilities for integration tests.
//!
//! - [`app_builder::TestAppBuilder`] - Build the application router exactly as
//!   `main.rs` does, with a controllable clock and injectable collaborators.
//!
//! ```ignore
//! use crate::common::app_builder::{TestAppBuilder, STUDENT_TOKEN, COURSE_ID};
//!
//! #[tokio::test]
//! async fn test_with_app() {
//!     let app = TestAppBuilder::new().build();
//!     let sealed = app.seal(COURSE_ID, STUDENT_SUBJECT);
//!     let (status, _, body) = app.send(app.request(&sealed, Some(STUDENT_TOKEN))).await;
//! }
//! ```

pub mod app_builder;
