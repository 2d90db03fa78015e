//! Envelope encryption through a KMS key, with end-to-end integrity checks.
//!
//! Every outgoing field carries a CRC32C checksum. Before a result is handed
//! back, [`KmsAead`] checks that the service answered for the key that was
//! asked for, that it confirmed the input checksums, and that the returned
//! payload matches its declared checksum.

use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::{AeadBackend, DecryptCall, EncryptCall};
use crate::checksum::{self, Field};
use crate::error::KmsError;
use crate::key_name::{key_version_to_key_name, KeyName, KeyNamePattern};
use crate::rest::{CloudKmsRest, RestBackend};
use crate::rpc::{KeyManagementService, RpcBackend};

/// Authenticated encryption with associated data.
#[async_trait]
pub trait Aead: Send + Sync {
    async fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, KmsError>;

    async fn decrypt(&self, ciphertext: &[u8], associated_data: &[u8])
        -> Result<Vec<u8>, KmsError>;
}

/// [`Aead`] backed by a symmetric key held in the KMS.
#[derive(Clone)]
pub struct KmsAead {
    backend: Arc<dyn AeadBackend>,
    key_name: KeyName,
}

impl std::fmt::Debug for KmsAead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsAead")
            .field("key_name", &self.key_name)
            .finish_non_exhaustive()
    }
}

impl KmsAead {
    pub fn builder() -> KmsAeadBuilder {
        KmsAeadBuilder::default()
    }

    /// Uses an already chosen backend. Fails unless `key_name` names a crypto
    /// key; a key version would never match the name echoed on encrypt.
    pub fn new(backend: Arc<dyn AeadBackend>, key_name: KeyName) -> Result<Self, KmsError> {
        if !KeyNamePattern::CryptoKey.matches(key_name.as_str()) {
            let pattern = KeyNamePattern::CryptoKey.as_str();
            return Err(KmsError::InvalidKeyName {
                reason: format!("the key name must follow {pattern}"),
                name: key_name.to_string(),
            });
        }
        Ok(Self { backend, key_name })
    }

    pub fn key_name(&self) -> &KeyName {
        &self.key_name
    }
}

#[async_trait]
impl Aead for KmsAead {
    async fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, KmsError> {
        let call = EncryptCall {
            name: self.key_name.to_string(),
            plaintext: plaintext.to_vec(),
            plaintext_crc32c: Some(checksum::compute(plaintext)),
            additional_authenticated_data: associated_data.to_vec(),
            additional_authenticated_data_crc32c: Some(checksum::compute(associated_data)),
        };
        let response = self
            .backend
            .encrypt(call)
            .await
            .map_err(|source| KmsError::RemoteOperationFailed {
                operation: "encryption",
                source,
            })?;

        let response_key = key_version_to_key_name(&response.name);
        if response_key != self.key_name.as_str() {
            tracing::warn!(expected = %self.key_name, actual = %response.name, "key name mismatch");
            return Err(KmsError::KeyNameMismatch {
                expected: self.key_name.to_string(),
                actual: response.name,
            });
        }
        if !response.verified_plaintext_crc32c {
            tracing::warn!(key = %self.key_name, "plaintext checksum not verified by KMS");
            return Err(KmsError::InputNotVerified(Field::Plaintext));
        }
        if !response.verified_additional_authenticated_data_crc32c {
            tracing::warn!(key = %self.key_name, "associated data checksum not verified by KMS");
            return Err(KmsError::InputNotVerified(Field::AdditionalAuthenticatedData));
        }
        checksum::expect(&response.ciphertext, response.ciphertext_crc32c, Field::Ciphertext)?;

        Ok(response.ciphertext)
    }

    async fn decrypt(
        &self,
        ciphertext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>, KmsError> {
        let call = DecryptCall {
            name: self.key_name.to_string(),
            ciphertext: ciphertext.to_vec(),
            ciphertext_crc32c: Some(checksum::compute(ciphertext)),
            additional_authenticated_data: associated_data.to_vec(),
            additional_authenticated_data_crc32c: Some(checksum::compute(associated_data)),
        };
        let response = self
            .backend
            .decrypt(call)
            .await
            .map_err(|source| KmsError::RemoteOperationFailed {
                operation: "decryption",
                source,
            })?;

        checksum::expect(&response.plaintext, response.plaintext_crc32c, Field::Plaintext)?;

        Ok(response.plaintext)
    }
}

/// Collects the key name and exactly one client, then validates them all at
/// once in [`KmsAeadBuilder::build`].
#[derive(Default)]
pub struct KmsAeadBuilder {
    key_name: Option<String>,
    rest_client: Option<Arc<dyn CloudKmsRest>>,
    rpc_client: Option<Arc<dyn KeyManagementService>>,
}

impl KmsAeadBuilder {
    /// Resource name of the key, `projects/*/locations/*/keyRings/*/cryptoKeys/*`.
    pub fn key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into());
        self
    }

    pub fn rest_client(mut self, client: Arc<dyn CloudKmsRest>) -> Self {
        self.rest_client = Some(client);
        self
    }

    pub fn rpc_client(mut self, client: Arc<dyn KeyManagementService>) -> Self {
        self.rpc_client = Some(client);
        self
    }

    pub fn build(self) -> Result<KmsAead, KmsError> {
        let Some(key_name) = self.key_name else {
            return Err(KmsError::InvalidKeyName {
                name: String::new(),
                reason: "the key name is not set".into(),
            });
        };
        let key_name = KeyName::parse(key_name, KeyNamePattern::CryptoKey)?;

        let backend: Arc<dyn AeadBackend> = match (self.rest_client, self.rpc_client) {
            (Some(rest), None) => Arc::new(RestBackend::new(rest)),
            (None, Some(rpc)) => Arc::new(RpcBackend::new(rpc)),
            _ => {
                return Err(KmsError::InvalidConfiguration(
                    "exactly one of the REST or the RPC client must be provided".into(),
                ))
            }
        };
        tracing::info!(key = %key_name, "KMS AEAD ready");

        KmsAead::new(backend, key_name)
    }
}
