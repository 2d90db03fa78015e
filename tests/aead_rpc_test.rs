mod common;

use std::sync::Arc;

use aes_gcm::aead::{Aead as _, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use common::{init_tracing, KEY_ID};
use kms_integrity::checksum::{self, Field};
use kms_integrity::error::RpcCode;
use kms_integrity::rpc::{
    DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, KeyManagementService,
    ProtectionLevel,
};
use kms_integrity::{Aead, KmsAead, KmsError, RemoteError};

const KEY_RING: &str = "projects/cloudkms-test/locations/global/keyRings/KR/cryptoKeys";

fn key(suffix: &str) -> String {
    format!("{KEY_RING}/{suffix}")
}

/// Encrypts with a local AES-256-GCM key and misbehaves for a few reserved
/// key IDs.
struct LocalKms {
    aead: Aes256Gcm,
}

impl LocalKms {
    fn new() -> Self {
        Self {
            aead: Aes256Gcm::new(&Aes256Gcm::generate_key(&mut OsRng)),
        }
    }
}

#[async_trait]
impl KeyManagementService for LocalKms {
    async fn encrypt(&self, request: EncryptRequest) -> Result<EncryptResponse, RemoteError> {
        if request.name.ends_with("/unavailable") {
            return Err(RemoteError::rpc(RpcCode::Unavailable, "service unavailable"));
        }

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .aead
            .encrypt(
                &nonce,
                Payload {
                    msg: &request.plaintext,
                    aad: &request.additional_authenticated_data,
                },
            )
            .map_err(|_| RemoteError::Crypto("encryption failed".into()))?;
        let ciphertext = [nonce.as_slice(), &sealed[..]].concat();

        let mut response = EncryptResponse {
            name: format!("{}/cryptoKeyVersions/1", request.name),
            ciphertext_crc32c: Some(checksum::compute(&ciphertext)),
            ciphertext,
            verified_plaintext_crc32c: request.plaintext_crc32c
                == Some(checksum::compute(&request.plaintext)),
            verified_additional_authenticated_data_crc32c: request
                .additional_authenticated_data_crc32c
                == Some(checksum::compute(&request.additional_authenticated_data)),
            protection_level: ProtectionLevel::Hsm,
        };
        match request.name.rsplit('/').next() {
            Some("name-not-set") => response.name.clear(),
            Some("plaintext-not-verified") => response.verified_plaintext_crc32c = false,
            Some("aad-not-verified") => {
                response.verified_additional_authenticated_data_crc32c = false
            }
            Some("invalid-ciphertext-crc") => {
                response.ciphertext_crc32c = response.ciphertext_crc32c.map(|c| c ^ 1)
            }
            Some("no-ciphertext-crc") => response.ciphertext_crc32c = None,
            _ => {}
        }
        Ok(response)
    }

    async fn decrypt(&self, request: DecryptRequest) -> Result<DecryptResponse, RemoteError> {
        if request.ciphertext.len() < 12 {
            return Err(RemoteError::rpc(RpcCode::InvalidArgument, "ciphertext too short"));
        }
        let (nonce, sealed) = request.ciphertext.split_at(12);
        let plaintext = self
            .aead
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: sealed,
                    aad: &request.additional_authenticated_data,
                },
            )
            .map_err(|_| RemoteError::rpc(RpcCode::InvalidArgument, "decryption failed"))?;

        let mut response = DecryptResponse {
            plaintext_crc32c: Some(checksum::compute(&plaintext)),
            plaintext,
            used_primary: true,
            protection_level: ProtectionLevel::Hsm,
        };
        if request.name.ends_with("/invalid-plaintext-crc") {
            response.plaintext_crc32c = response.plaintext_crc32c.map(|c| c + 1);
        }
        Ok(response)
    }
}

fn aead_for(key_id: &str) -> KmsAead {
    KmsAead::builder()
        .key_name(key_id)
        .rpc_client(Arc::new(LocalKms::new()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn encrypt_decrypt_round_trip() {
    init_tracing();
    let aead = aead_for(KEY_ID);

    let ciphertext = aead.encrypt(b"plaintext", b"associated data").await.unwrap();
    assert_eq!(
        aead.decrypt(&ciphertext, b"associated data").await.unwrap(),
        b"plaintext"
    );
    assert!(aead.decrypt(&ciphertext, b"other data").await.is_err());
}

#[tokio::test]
async fn empty_plaintext_round_trips() {
    let aead = aead_for(KEY_ID);

    let ciphertext = aead.encrypt(b"", b"").await.unwrap();
    assert!(aead.decrypt(&ciphertext, b"").await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_response_name_is_rejected() {
    let aead = aead_for(&key("name-not-set"));

    let err = aead.encrypt(b"plaintext", b"ad").await.unwrap_err();
    match err {
        KmsError::KeyNameMismatch { expected, actual } => {
            assert_eq!(expected, key("name-not-set"));
            assert!(actual.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn unverified_plaintext_is_rejected() {
    let err = aead_for(&key("plaintext-not-verified"))
        .encrypt(b"plaintext", b"ad")
        .await
        .unwrap_err();
    assert!(matches!(err, KmsError::InputNotVerified(Field::Plaintext)));
}

#[tokio::test]
async fn unverified_associated_data_is_rejected() {
    let err = aead_for(&key("aad-not-verified"))
        .encrypt(b"plaintext", b"ad")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KmsError::InputNotVerified(Field::AdditionalAuthenticatedData)
    ));
}

#[tokio::test]
async fn invalid_ciphertext_checksum_is_rejected() {
    let err = aead_for(&key("invalid-ciphertext-crc"))
        .encrypt(b"plaintext", b"ad")
        .await
        .unwrap_err();
    match err {
        KmsError::ChecksumMismatch(mismatch) => {
            assert_eq!(mismatch.field, Field::Ciphertext);
            assert!(mismatch.declared.is_some());
            assert_ne!(mismatch.declared, Some(mismatch.computed));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn absent_ciphertext_checksum_is_rejected() {
    let err = aead_for(&key("no-ciphertext-crc"))
        .encrypt(b"plaintext", b"ad")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        KmsError::ChecksumMismatch(ref mismatch) if mismatch.declared.is_none()
    ));
}

#[tokio::test]
async fn invalid_plaintext_checksum_is_rejected() {
    let aead = aead_for(&key("invalid-plaintext-crc"));

    let ciphertext = aead.encrypt(b"plaintext", b"ad").await.unwrap();
    let err = aead.decrypt(&ciphertext, b"ad").await.unwrap_err();
    match err {
        KmsError::ChecksumMismatch(mismatch) => assert_eq!(mismatch.field, Field::Plaintext),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn service_errors_are_wrapped() {
    let err = aead_for(&key("unavailable"))
        .encrypt(b"plaintext", b"ad")
        .await
        .unwrap_err();
    match &err {
        KmsError::RemoteOperationFailed {
            operation,
            source: RemoteError::Rpc { code, .. },
        } => {
            assert_eq!(*operation, "encryption");
            assert_eq!(*code, RpcCode::Unavailable);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(std::error::Error::source(&err).is_some());
}

#[tokio::test]
async fn unimplemented_calls_fail_cleanly() {
    struct Unserved;

    #[async_trait]
    impl KeyManagementService for Unserved {}

    let aead = KmsAead::builder()
        .key_name(KEY_ID)
        .rpc_client(Arc::new(Unserved))
        .build()
        .unwrap();

    let err = aead.decrypt(b"ciphertext", b"").await.unwrap_err();
    assert!(matches!(
        err,
        KmsError::RemoteOperationFailed {
            operation: "decryption",
            source: RemoteError::Rpc {
                code: RpcCode::Unimplemented,
                ..
            },
        }
    ));
}
