//! Integrity-checked encryption and signing through a remote KMS.
//!
//! [`KmsAead`] and [`KmsSigner`] forward requests to the key management
//! service and only return a result once the service has confirmed the
//! checksums of what it received, the result's checksum matches, and the
//! response names the key that was asked for.
//!
//! [`FakeKms`] emulates the HTTP surface in memory for tests.

pub mod aead;
pub mod backend;
pub mod checksum;
pub mod config;
pub mod error;
pub mod fake_kms;
#[cfg(feature = "google-cloud")]
pub mod gcp;
pub mod key_name;
pub mod rest;
pub mod rpc;
pub mod signer;

pub use aead::{Aead, KmsAead};
pub use config::RestConfig;
pub use error::{KmsError, RemoteError};
pub use fake_kms::FakeKms;
#[cfg(feature = "google-cloud")]
pub use gcp::GcpKmsClient;
pub use key_name::{GcpKeyRef, KeyName, KeyNamePattern};
pub use rest::RestKmsClient;
pub use signer::{KmsSigner, PublicKeySign, MAX_SIGN_DATA_SIZE};
