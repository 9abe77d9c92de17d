//! Integration test crate for the rpool workspace.
//!
//! This crate has no library code. It only contains integration tests that
//! exercise stake, rewards, deployment and persistence together.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p rpool-integration-tests
//! ```
