//! [`KeyManagementService`] over the Google Cloud client library.
//!
//! Only the message conversion lives here. Callers build the underlying
//! client themselves, credentials and endpoint included.

use async_trait::async_trait;
use google_cloud_kms_v1::client::KeyManagementService as CloudKmsClient;
use google_cloud_kms_v1::model;

use crate::error::{RemoteError, RpcCode};
use crate::rpc::{
    AsymmetricSignRequest, AsymmetricSignResponse, CryptoKeyVersionAlgorithm, DecryptRequest,
    DecryptResponse, Digest, EncryptRequest, EncryptResponse, GetPublicKeyRequest,
    KeyManagementService, ProtectionLevel, PublicKey,
};

/// Production [`KeyManagementService`], e.g. for
/// `KmsAead::builder().rpc_client(Arc::new(GcpKmsClient::new(client)))`
/// where `client` comes from `CloudKmsClient::builder().build().await`.
#[derive(Clone)]
pub struct GcpKmsClient {
    client: CloudKmsClient,
}

impl GcpKmsClient {
    pub fn new(client: CloudKmsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KeyManagementService for GcpKmsClient {
    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse, RemoteError> {
        let mut call = self
            .client
            .encrypt()
            .set_name(request.name)
            .set_plaintext(request.plaintext)
            .set_additional_authenticated_data(request.additional_authenticated_data);
        if let Some(crc) = request.plaintext_crc32c {
            call = call.set_plaintext_crc32c(crc);
        }
        if let Some(crc) = request.additional_authenticated_data_crc32c {
            call = call.set_additional_authenticated_data_crc32c(crc);
        }

        let response = call.send().await.map_err(call_failed)?;
        Ok(encrypt_response(response))
    }

    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse, RemoteError> {
        let mut call = self
            .client
            .decrypt()
            .set_name(request.name)
            .set_ciphertext(request.ciphertext)
            .set_additional_authenticated_data(request.additional_authenticated_data);
        if let Some(crc) = request.ciphertext_crc32c {
            call = call.set_ciphertext_crc32c(crc);
        }
        if let Some(crc) = request.additional_authenticated_data_crc32c {
            call = call.set_additional_authenticated_data_crc32c(crc);
        }

        let response = call.send().await.map_err(call_failed)?;
        Ok(decrypt_response(response))
    }

    async fn asymmetric_sign(
        &self,
        request: AsymmetricSignRequest,
    ) -> Result<AsymmetricSignResponse, RemoteError> {
        let mut call = self
            .client
            .asymmetric_sign()
            .set_name(request.name)
            .set_data(request.data);
        if let Some(digest) = &request.digest {
            call = call.set_digest(gcp_digest(digest));
        }
        if let Some(crc) = request.digest_crc32c {
            call = call.set_digest_crc32c(crc);
        }
        if let Some(crc) = request.data_crc32c {
            call = call.set_data_crc32c(crc);
        }

        let response = call.send().await.map_err(call_failed)?;
        Ok(sign_response(response))
    }

    async fn get_public_key(&self, request: GetPublicKeyRequest) -> Result<PublicKey, RemoteError> {
        let response = self
            .client
            .get_public_key()
            .set_name(request.name)
            .send()
            .await
            .map_err(call_failed)?;
        tracing::debug!(name = %response.name, "fetched public key");
        Ok(public_key(response))
    }
}

fn call_failed(e: google_cloud_kms_v1::Error) -> RemoteError {
    RemoteError::rpc(RpcCode::Unknown, e.to_string())
}

fn gcp_digest(digest: &Digest) -> model::Digest {
    match digest {
        Digest::Sha256(d) => model::Digest::new().set_sha256(d.clone()),
        Digest::Sha384(d) => model::Digest::new().set_sha384(d.clone()),
        Digest::Sha512(d) => model::Digest::new().set_sha512(d.clone()),
    }
}

fn protection_level(level: &model::ProtectionLevel) -> ProtectionLevel {
    level
        .name()
        .map(ProtectionLevel::from_proto_name)
        .unwrap_or_default()
}

fn algorithm(
    algorithm: &model::crypto_key_version::CryptoKeyVersionAlgorithm,
) -> CryptoKeyVersionAlgorithm {
    algorithm
        .name()
        .map(CryptoKeyVersionAlgorithm::from_proto_name)
        .unwrap_or_default()
}

fn encrypt_response(response: model::EncryptResponse) -> EncryptResponse {
    EncryptResponse {
        protection_level: protection_level(&response.protection_level),
        name: response.name,
        ciphertext: response.ciphertext.to_vec(),
        ciphertext_crc32c: response.ciphertext_crc32c,
        verified_plaintext_crc32c: response.verified_plaintext_crc32c,
        verified_additional_authenticated_data_crc32c: response
            .verified_additional_authenticated_data_crc32c,
    }
}

fn decrypt_response(response: model::DecryptResponse) -> DecryptResponse {
    DecryptResponse {
        protection_level: protection_level(&response.protection_level),
        plaintext: response.plaintext.to_vec(),
        plaintext_crc32c: response.plaintext_crc32c,
        used_primary: response.used_primary,
    }
}

fn sign_response(response: model::AsymmetricSignResponse) -> AsymmetricSignResponse {
    AsymmetricSignResponse {
        protection_level: protection_level(&response.protection_level),
        name: response.name,
        signature: response.signature.to_vec(),
        signature_crc32c: response.signature_crc32c,
        verified_digest_crc32c: response.verified_digest_crc32c,
        verified_data_crc32c: response.verified_data_crc32c,
    }
}

fn public_key(response: model::PublicKey) -> PublicKey {
    PublicKey {
        algorithm: algorithm(&response.algorithm),
        protection_level: protection_level(&response.protection_level),
        name: response.name,
        pem: response.pem,
        pem_crc32c: response.pem_crc32c,
    }
}
