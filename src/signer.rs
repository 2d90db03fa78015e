//! Asymmetric signing with a KMS key version.
//!
//! The key's algorithm and protection level are read once when the signer is
//! built. They decide, for every call, whether the service receives the data
//! itself or a digest of it.

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Sha256, Sha384, Sha512};

use crate::checksum::{self, Field};
use crate::error::KmsError;
use crate::key_name::{KeyName, KeyNamePattern};
use crate::rpc::{
    AsymmetricSignRequest, CryptoKeyVersionAlgorithm, Digest, GetPublicKeyRequest,
    KeyManagementService, ProtectionLevel, PublicKey,
};

/// Largest input [`KmsSigner::sign`] accepts.
pub const MAX_SIGN_DATA_SIZE: usize = 64 * 1024;

#[async_trait]
pub trait PublicKeySign: Send + Sync {
    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KmsError>;
}

#[derive(Clone)]
pub struct KmsSigner {
    client: Arc<dyn KeyManagementService>,
    key_name: KeyName,
    // Read from KMS at build time; holds the algorithm and protection level.
    public_key: PublicKey,
}

impl std::fmt::Debug for KmsSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KmsSigner")
            .field("key_name", &self.key_name)
            .field("algorithm", &self.public_key.algorithm)
            .field("protection_level", &self.public_key.protection_level)
            .finish_non_exhaustive()
    }
}

impl KmsSigner {
    pub fn builder() -> KmsSignerBuilder {
        KmsSignerBuilder::default()
    }

    pub fn key_name(&self) -> &KeyName {
        &self.key_name
    }

    /// Public key and key metadata fetched when the signer was built.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }
}

#[async_trait]
impl PublicKeySign for KmsSigner {
    async fn sign(&self, data: &[u8]) -> Result<Vec<u8>, KmsError> {
        if data.len() > MAX_SIGN_DATA_SIZE {
            return Err(KmsError::PayloadTooLarge {
                size: data.len(),
                max: MAX_SIGN_DATA_SIZE,
            });
        }

        let algorithm = self.public_key.algorithm;
        let send_data = requires_data_for_sign(algorithm, self.public_key.protection_level);
        let mut request = AsymmetricSignRequest {
            name: self.key_name.to_string(),
            ..Default::default()
        };
        if send_data {
            request.data = data.to_vec();
            request.data_crc32c = Some(checksum::compute(data));
        } else {
            let digest = compute_digest(data, algorithm)?;
            // Over the raw digest bytes, which is what the service checksums.
            request.digest_crc32c = Some(checksum::compute(digest.as_bytes()));
            request.digest = Some(digest);
        }
        tracing::debug!(key = %self.key_name, ?algorithm, send_data, "asymmetric sign");

        let response = self.client.asymmetric_sign(request).await.map_err(|source| {
            KmsError::RemoteOperationFailed {
                operation: "asymmetric sign",
                source,
            }
        })?;

        if response.name != self.key_name.as_str() {
            tracing::warn!(expected = %self.key_name, actual = %response.name, "key name mismatch");
            return Err(KmsError::KeyNameMismatch {
                expected: self.key_name.to_string(),
                actual: response.name,
            });
        }
        let (sent, verified, other) = if send_data {
            (Field::Data, response.verified_data_crc32c, response.verified_digest_crc32c)
        } else {
            (Field::Digest, response.verified_digest_crc32c, response.verified_data_crc32c)
        };
        if !verified || other {
            tracing::warn!(key = %self.key_name, field = %sent, "input checksum not verified by KMS");
            return Err(KmsError::InputNotVerified(sent));
        }
        checksum::expect(&response.signature, response.signature_crc32c, Field::Signature)?;

        Ok(response.signature)
    }
}

/// Whether the service must receive the data itself rather than a digest.
pub fn requires_data_for_sign(
    algorithm: CryptoKeyVersionAlgorithm,
    protection_level: ProtectionLevel,
) -> bool {
    use CryptoKeyVersionAlgorithm::*;

    matches!(
        algorithm,
        RsaSignRawPkcs12048 | RsaSignRawPkcs13072 | RsaSignRawPkcs14096 | EcSignEd25519
    ) || matches!(
        protection_level,
        ProtectionLevel::External | ProtectionLevel::ExternalVpc
    )
}

/// Hashes `data` with the function `algorithm` signs over.
pub fn compute_digest(data: &[u8], algorithm: CryptoKeyVersionAlgorithm) -> Result<Digest, KmsError> {
    use CryptoKeyVersionAlgorithm::*;

    match algorithm {
        EcSignP256Sha256
        | EcSignSecp256k1Sha256
        | RsaSignPss2048Sha256
        | RsaSignPss3072Sha256
        | RsaSignPss4096Sha256
        | RsaSignPkcs12048Sha256
        | RsaSignPkcs13072Sha256
        | RsaSignPkcs14096Sha256 => Ok(Digest::Sha256(hash::<Sha256>(data))),
        EcSignP384Sha384 => Ok(Digest::Sha384(hash::<Sha384>(data))),
        RsaSignPss4096Sha512 | RsaSignPkcs14096Sha512 => Ok(Digest::Sha512(hash::<Sha512>(data))),
        other => Err(KmsError::UnsupportedDigestAlgorithm(other)),
    }
}

fn hash<D: digest::Digest>(data: &[u8]) -> Vec<u8> {
    D::digest(data).to_vec()
}

#[derive(Default)]
pub struct KmsSignerBuilder {
    key_name: Option<String>,
    client: Option<Arc<dyn KeyManagementService>>,
}

impl KmsSignerBuilder {
    /// Resource name of the key version,
    /// `projects/*/locations/*/keyRings/*/cryptoKeys/*/cryptoKeyVersions/*`.
    pub fn key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into());
        self
    }

    pub fn rpc_client(mut self, client: Arc<dyn KeyManagementService>) -> Self {
        self.client = Some(client);
        self
    }

    /// Validates the configuration and fetches the key's public key, which
    /// determines how later sign requests are prepared.
    pub async fn build(self) -> Result<KmsSigner, KmsError> {
        let Some(key_name) = self.key_name else {
            return Err(KmsError::InvalidKeyName {
                name: String::new(),
                reason: "the key name is not set".into(),
            });
        };
        let key_name = KeyName::parse(key_name, KeyNamePattern::CryptoKeyVersion)?;
        let Some(client) = self.client else {
            return Err(KmsError::InvalidConfiguration(
                "the RPC client must be provided".into(),
            ));
        };

        let public_key = client
            .get_public_key(GetPublicKeyRequest {
                name: key_name.to_string(),
            })
            .await
            .map_err(|source| KmsError::KeyDescriptorUnavailable {
                name: key_name.to_string(),
                source,
            })?;
        checksum::verify(
            Some(public_key.pem.as_bytes()),
            public_key.pem_crc32c,
            Field::PublicKeyPem,
        )?;
        tracing::info!(
            key = %key_name,
            algorithm = ?public_key.algorithm,
            protection_level = ?public_key.protection_level,
            "KMS signer ready"
        );

        Ok(KmsSigner {
            client,
            key_name,
            public_key,
        })
    }
}
