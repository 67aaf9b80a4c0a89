//! # Keyward Testkit
//!
//! Testing utilities for Keyward.
//!
//! ## Overview
//!
//! - **Golden vectors**: fixed ciphertexts for the deterministic cipher modes
//! - **Generators**: proptest strategies for property-based testing
//! - **Fixtures**: an in-memory vault with a mailer that records what it sends
//!
//! ## Golden Vectors
//!
//! ```rust
//! use keyward_testkit::vectors::{all_vectors, encrypt_vector};
//!
//! for vector in all_vectors() {
//!     assert_eq!(hex::encode(encrypt_vector(&vector)), vector.expected_hex);
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use keyward_testkit::fixtures::TestVault;
//!
//! async fn example() {
//!     let t = TestVault::new();
//!     let alice = t.register("alice").await;
//!     let file = t.upload_file(alice.id, "a.txt", "text", b"hi").await.unwrap();
//!     assert_eq!(t.get_file(alice.id, file.id).await.unwrap().content, b"hi");
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{MemoryVault, RecordingMailer, SentMail, TestVault, TEST_RSA_BITS};
