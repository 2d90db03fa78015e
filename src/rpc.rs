//! Binary RPC surface of the key management service.
//!
//! Blobs are raw bytes, checksums are optional wrapped int64s and the
//! verified flags are plain booleans that default to `false`.

use std::sync::Arc;

use async_trait::async_trait;

use crate::backend::{AeadBackend, DecryptCall, DecryptReply, EncryptCall, EncryptReply};
use crate::error::{RemoteError, RpcCode};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CryptoKeyVersionAlgorithm {
    #[default]
    Unspecified,
    GoogleSymmetricEncryption,
    RsaSignPss2048Sha256,
    RsaSignPss3072Sha256,
    RsaSignPss4096Sha256,
    RsaSignPss4096Sha512,
    RsaSignPkcs12048Sha256,
    RsaSignPkcs13072Sha256,
    RsaSignPkcs14096Sha256,
    RsaSignPkcs14096Sha512,
    RsaSignRawPkcs12048,
    RsaSignRawPkcs13072,
    RsaSignRawPkcs14096,
    RsaDecryptOaep2048Sha256,
    RsaDecryptOaep3072Sha256,
    RsaDecryptOaep4096Sha256,
    RsaDecryptOaep4096Sha512,
    EcSignP256Sha256,
    EcSignP384Sha384,
    EcSignSecp256k1Sha256,
    EcSignEd25519,
    HmacSha256,
    HmacSha1,
    HmacSha384,
    HmacSha512,
    HmacSha224,
    ExternalSymmetricEncryption,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ProtectionLevel {
    #[default]
    Unspecified,
    Software,
    Hsm,
    External,
    ExternalVpc,
}

impl CryptoKeyVersionAlgorithm {
    /// Looks up an algorithm by its wire enum name, e.g. `EC_SIGN_ED25519`.
    /// Names this crate does not know map to `Unspecified`.
    pub fn from_proto_name(name: &str) -> Self {
        use CryptoKeyVersionAlgorithm::*;
        match name {
            "GOOGLE_SYMMETRIC_ENCRYPTION" => GoogleSymmetricEncryption,
            "RSA_SIGN_PSS_2048_SHA256" => RsaSignPss2048Sha256,
            "RSA_SIGN_PSS_3072_SHA256" => RsaSignPss3072Sha256,
            "RSA_SIGN_PSS_4096_SHA256" => RsaSignPss4096Sha256,
            "RSA_SIGN_PSS_4096_SHA512" => RsaSignPss4096Sha512,
            "RSA_SIGN_PKCS1_2048_SHA256" => RsaSignPkcs12048Sha256,
            "RSA_SIGN_PKCS1_3072_SHA256" => RsaSignPkcs13072Sha256,
            "RSA_SIGN_PKCS1_4096_SHA256" => RsaSignPkcs14096Sha256,
            "RSA_SIGN_PKCS1_4096_SHA512" => RsaSignPkcs14096Sha512,
            "RSA_SIGN_RAW_PKCS1_2048" => RsaSignRawPkcs12048,
            "RSA_SIGN_RAW_PKCS1_3072" => RsaSignRawPkcs13072,
            "RSA_SIGN_RAW_PKCS1_4096" => RsaSignRawPkcs14096,
            "RSA_DECRYPT_OAEP_2048_SHA256" => RsaDecryptOaep2048Sha256,
            "RSA_DECRYPT_OAEP_3072_SHA256" => RsaDecryptOaep3072Sha256,
            "RSA_DECRYPT_OAEP_4096_SHA256" => RsaDecryptOaep4096Sha256,
            "RSA_DECRYPT_OAEP_4096_SHA512" => RsaDecryptOaep4096Sha512,
            "EC_SIGN_P256_SHA256" => EcSignP256Sha256,
            "EC_SIGN_P384_SHA384" => EcSignP384Sha384,
            "EC_SIGN_SECP256K1_SHA256" => EcSignSecp256k1Sha256,
            "EC_SIGN_ED25519" => EcSignEd25519,
            "HMAC_SHA256" => HmacSha256,
            "HMAC_SHA1" => HmacSha1,
            "HMAC_SHA384" => HmacSha384,
            "HMAC_SHA512" => HmacSha512,
            "HMAC_SHA224" => HmacSha224,
            "EXTERNAL_SYMMETRIC_ENCRYPTION" => ExternalSymmetricEncryption,
            _ => Unspecified,
        }
    }
}

impl ProtectionLevel {
    pub fn from_proto_name(name: &str) -> Self {
        match name {
            "SOFTWARE" => ProtectionLevel::Software,
            "HSM" => ProtectionLevel::Hsm,
            "EXTERNAL" => ProtectionLevel::External,
            "EXTERNAL_VPC" => ProtectionLevel::ExternalVpc,
            _ => ProtectionLevel::Unspecified,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptRequest {
    pub name: String,
    pub plaintext: Vec<u8>,
    pub additional_authenticated_data: Vec<u8>,
    pub plaintext_crc32c: Option<i64>,
    pub additional_authenticated_data_crc32c: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncryptResponse {
    pub name: String,
    pub ciphertext: Vec<u8>,
    pub ciphertext_crc32c: Option<i64>,
    pub verified_plaintext_crc32c: bool,
    pub verified_additional_authenticated_data_crc32c: bool,
    pub protection_level: ProtectionLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecryptRequest {
    pub name: String,
    pub ciphertext: Vec<u8>,
    pub additional_authenticated_data: Vec<u8>,
    pub ciphertext_crc32c: Option<i64>,
    pub additional_authenticated_data_crc32c: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecryptResponse {
    pub plaintext: Vec<u8>,
    pub plaintext_crc32c: Option<i64>,
    pub used_primary: bool,
    pub protection_level: ProtectionLevel,
}

/// Message digest sent in place of the data for digest-based algorithms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Digest {
    Sha256(Vec<u8>),
    Sha384(Vec<u8>),
    Sha512(Vec<u8>),
}

impl Digest {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Digest::Sha256(d) | Digest::Sha384(d) | Digest::Sha512(d) => d,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsymmetricSignRequest {
    pub name: String,
    pub digest: Option<Digest>,
    pub digest_crc32c: Option<i64>,
    pub data: Vec<u8>,
    pub data_crc32c: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AsymmetricSignResponse {
    pub name: String,
    pub signature: Vec<u8>,
    pub signature_crc32c: Option<i64>,
    pub verified_digest_crc32c: bool,
    pub verified_data_crc32c: bool,
    pub protection_level: ProtectionLevel,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetPublicKeyRequest {
    pub name: String,
}

/// Public half of a key version together with how it must be used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublicKey {
    pub name: String,
    pub pem: String,
    pub pem_crc32c: Option<i64>,
    pub algorithm: CryptoKeyVersionAlgorithm,
    pub protection_level: ProtectionLevel,
}

/// Client side of the RPC service. Implementations only need to provide the
/// calls they serve; the rest fail as unimplemented.
#[async_trait]
pub trait KeyManagementService: Send + Sync {
    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse, RemoteError> {
        let _ = request;
        Err(unimplemented_call("Encrypt"))
    }

    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse, RemoteError> {
        let _ = request;
        Err(unimplemented_call("Decrypt"))
    }

    async fn asymmetric_sign(
        &self,
        request: AsymmetricSignRequest,
    ) -> Result<AsymmetricSignResponse, RemoteError> {
        let _ = request;
        Err(unimplemented_call("AsymmetricSign"))
    }

    async fn get_public_key(&self, request: GetPublicKeyRequest) -> Result<PublicKey, RemoteError> {
        let _ = request;
        Err(unimplemented_call("GetPublicKey"))
    }
}

fn unimplemented_call(method: &str) -> RemoteError {
    RemoteError::rpc(RpcCode::Unimplemented, format!("{method} is not implemented"))
}

/// Runs [`crate::aead::KmsAead`] calls over a [`KeyManagementService`].
#[derive(Clone)]
pub struct RpcBackend {
    client: Arc<dyn KeyManagementService>,
}

impl RpcBackend {
    pub fn new(client: Arc<dyn KeyManagementService>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AeadBackend for RpcBackend {
    async fn encrypt(&self, call: EncryptCall) -> Result<EncryptReply, RemoteError> {
        let response = self
            .client
            .encrypt(EncryptRequest {
                name: call.name,
                plaintext: call.plaintext,
                additional_authenticated_data: call.additional_authenticated_data,
                plaintext_crc32c: call.plaintext_crc32c,
                additional_authenticated_data_crc32c: call.additional_authenticated_data_crc32c,
            })
            .await?;
        tracing::debug!(
            name = %response.name,
            protection_level = ?response.protection_level,
            "rpc encrypt returned"
        );

        Ok(EncryptReply {
            name: response.name,
            ciphertext: response.ciphertext,
            ciphertext_crc32c: response.ciphertext_crc32c,
            verified_plaintext_crc32c: response.verified_plaintext_crc32c,
            verified_additional_authenticated_data_crc32c: response
                .verified_additional_authenticated_data_crc32c,
        })
    }

    async fn decrypt(&self, call: DecryptCall) -> Result<DecryptReply, RemoteError> {
        let response = self
            .client
            .decrypt(DecryptRequest {
                name: call.name,
                ciphertext: call.ciphertext,
                additional_authenticated_data: call.additional_authenticated_data,
                ciphertext_crc32c: call.ciphertext_crc32c,
                additional_authenticated_data_crc32c: call.additional_authenticated_data_crc32c,
            })
            .await?;

        Ok(DecryptReply {
            plaintext: response.plaintext,
            plaintext_crc32c: response.plaintext_crc32c,
        })
    }
}
