//! The capability interface [`crate::aead::KmsAead`] talks to.
//!
//! Each transport adapts its own wire shape to these calls, so the integrity
//! checks are written once against [`EncryptReply`] and [`DecryptReply`].

use async_trait::async_trait;

use crate::error::RemoteError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptCall {
    pub name: String,
    pub plaintext: Vec<u8>,
    pub plaintext_crc32c: Option<i64>,
    pub additional_authenticated_data: Vec<u8>,
    pub additional_authenticated_data_crc32c: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptReply {
    /// Resource name the service says it used, usually a key version.
    pub name: String,
    pub ciphertext: Vec<u8>,
    pub ciphertext_crc32c: Option<i64>,
    pub verified_plaintext_crc32c: bool,
    pub verified_additional_authenticated_data_crc32c: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptCall {
    pub name: String,
    pub ciphertext: Vec<u8>,
    pub ciphertext_crc32c: Option<i64>,
    pub additional_authenticated_data: Vec<u8>,
    pub additional_authenticated_data_crc32c: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptReply {
    pub plaintext: Vec<u8>,
    pub plaintext_crc32c: Option<i64>,
}

#[async_trait]
pub trait AeadBackend: Send + Sync {
    async fn encrypt(&self, call: EncryptCall) -> Result<EncryptReply, RemoteError>;

    async fn decrypt(&self, call: DecryptCall) -> Result<DecryptReply, RemoteError>;
}
