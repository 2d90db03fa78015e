//! In-memory stand-in for the HTTP KMS surface.
//!
//! Every valid key ID gets its own freshly generated AES-128-GCM key when the
//! fake is built. Ciphertexts are `nonce || sealed`, so they only open under
//! the key ID that produced them.
//!
//! Like the real service, a call is prepared first and executed later: a
//! malformed key name is rejected while preparing, an unknown key only when
//! the call is executed.

use std::collections::HashMap;
use std::fmt;

use aes_gcm::aead::{Aead as _, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::{Aes128Gcm, Nonce};
use async_trait::async_trait;

use crate::checksum::{self, Field, Verification};
use crate::error::RemoteError;
use crate::key_name::KeyNamePattern;
use crate::rest::{CloudKmsRest, DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse};

const NONCE_LEN: usize = 12;
const PROTECTION_LEVEL: &str = "SOFTWARE";

pub struct FakeKms {
    aeads: HashMap<String, Aes128Gcm>,
    strict_encrypt_checksums: bool,
}

impl fmt::Debug for FakeKms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeKms")
            .field("key_ids", &self.key_ids())
            .field("strict_encrypt_checksums", &self.strict_encrypt_checksums)
            .finish()
    }
}

impl FakeKms {
    pub fn new<I, S>(valid_key_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let aeads = valid_key_ids
            .into_iter()
            .map(|id| {
                let key = Aes128Gcm::generate_key(&mut OsRng);
                (id.into(), Aes128Gcm::new(&key))
            })
            .collect();

        Self {
            aeads,
            strict_encrypt_checksums: false,
        }
    }

    /// By default a mismatched input checksum on encrypt only leaves the
    /// matching verified flag unset. With `strict` it fails the call, the way
    /// decrypt always does.
    pub fn with_strict_encrypt_checksums(mut self, strict: bool) -> Self {
        self.strict_encrypt_checksums = strict;
        self
    }

    /// Known key IDs, sorted.
    pub fn key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.aeads.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn prepare_encrypt(
        &self,
        name: &str,
        request: EncryptRequest,
    ) -> Result<PendingEncrypt<'_>, RemoteError> {
        check_name(name)?;
        Ok(PendingEncrypt {
            kms: self,
            name: name.to_string(),
            request,
        })
    }

    pub fn prepare_decrypt(
        &self,
        name: &str,
        request: DecryptRequest,
    ) -> Result<PendingDecrypt<'_>, RemoteError> {
        check_name(name)?;
        Ok(PendingDecrypt {
            kms: self,
            name: name.to_string(),
            request,
        })
    }

    fn aead(&self, name: &str) -> Result<&Aes128Gcm, RemoteError> {
        self.aeads.get(name).ok_or_else(|| RemoteError::UnknownKey {
            name: name.to_string(),
            known: self.key_ids(),
        })
    }

    /// Whether the verified flag should be set for an encrypt input.
    fn encrypt_input_verified(
        &self,
        payload: Option<&[u8]>,
        expected: Option<i64>,
        field: Field,
    ) -> Result<bool, RemoteError> {
        match checksum::verify(payload, expected, field) {
            Ok(Verification::Verified) => Ok(true),
            Ok(Verification::Skipped) => Ok(false),
            Err(mismatch) if self.strict_encrypt_checksums => Err(mismatch.into()),
            Err(mismatch) => {
                tracing::debug!(%mismatch, "fake KMS leaves encrypt input unverified");
                Ok(false)
            }
        }
    }
}

fn check_name(name: &str) -> Result<(), RemoteError> {
    if !KeyNamePattern::CryptoKeyPath.matches(name) {
        return Err(RemoteError::InvalidArgument(format!(
            "parameter name must conform to the pattern {}, got {name:?}",
            KeyNamePattern::CryptoKeyPath.as_str()
        )));
    }
    Ok(())
}

#[derive(Debug)]
pub struct PendingEncrypt<'a> {
    kms: &'a FakeKms,
    name: String,
    request: EncryptRequest,
}

impl PendingEncrypt<'_> {
    pub fn execute(self) -> Result<EncryptResponse, RemoteError> {
        let aead = self.kms.aead(&self.name)?;

        let plaintext = self.request.plaintext.as_deref();
        let verified_plaintext = self.kms.encrypt_input_verified(
            plaintext,
            self.request.plaintext_crc32c,
            Field::Plaintext,
        )?;
        let associated_data = self.request.additional_authenticated_data.as_deref();
        let verified_associated_data = self.kms.encrypt_input_verified(
            associated_data,
            self.request.additional_authenticated_data_crc32c,
            Field::AdditionalAuthenticatedData,
        )?;

        let ciphertext = seal(
            aead,
            plaintext.unwrap_or_default(),
            associated_data.unwrap_or_default(),
        )?;
        tracing::debug!(name = %self.name, len = ciphertext.len(), "fake KMS encrypted");

        Ok(EncryptResponse {
            name: Some(self.name),
            ciphertext_crc32c: Some(checksum::compute(&ciphertext)),
            ciphertext: Some(ciphertext),
            verified_plaintext_crc32c: verified_plaintext.then_some(true),
            verified_additional_authenticated_data_crc32c: verified_associated_data
                .then_some(true),
            protection_level: Some(PROTECTION_LEVEL.into()),
        })
    }
}

#[derive(Debug)]
pub struct PendingDecrypt<'a> {
    kms: &'a FakeKms,
    name: String,
    request: DecryptRequest,
}

impl PendingDecrypt<'_> {
    pub fn execute(self) -> Result<DecryptResponse, RemoteError> {
        let aead = self.kms.aead(&self.name)?;

        let ciphertext = self.request.ciphertext.as_deref();
        checksum::verify(ciphertext, self.request.ciphertext_crc32c, Field::Ciphertext)?;
        let associated_data = self.request.additional_authenticated_data.as_deref();
        checksum::verify(
            associated_data,
            self.request.additional_authenticated_data_crc32c,
            Field::AdditionalAuthenticatedData,
        )?;

        let plaintext = open(
            aead,
            ciphertext.unwrap_or_default(),
            associated_data.unwrap_or_default(),
        )?;
        tracing::debug!(name = %self.name, len = plaintext.len(), "fake KMS decrypted");

        // The real service omits the field for an empty plaintext.
        Ok(DecryptResponse {
            plaintext_crc32c: Some(checksum::compute(&plaintext)),
            plaintext: (!plaintext.is_empty()).then_some(plaintext),
            used_primary: Some(true),
            protection_level: Some(PROTECTION_LEVEL.into()),
        })
    }
}

fn seal(aead: &Aes128Gcm, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, RemoteError> {
    let nonce = Aes128Gcm::generate_nonce(&mut OsRng);
    let sealed = aead
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad: associated_data,
            },
        )
        .map_err(|_| RemoteError::Crypto("encryption failed".into()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

fn open(aead: &Aes128Gcm, ciphertext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, RemoteError> {
    if ciphertext.len() < NONCE_LEN {
        return Err(RemoteError::Crypto("ciphertext too short".into()));
    }
    let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
    aead.decrypt(
        Nonce::from_slice(nonce),
        Payload {
            msg: sealed,
            aad: associated_data,
        },
    )
    .map_err(|_| RemoteError::Crypto("decryption failed".into()))
}

#[async_trait]
impl CloudKmsRest for FakeKms {
    async fn encrypt(
        &self,
        name: &str,
        request: EncryptRequest,
    ) -> Result<EncryptResponse, RemoteError> {
        self.prepare_encrypt(name, request)?.execute()
    }

    async fn decrypt(
        &self,
        name: &str,
        request: DecryptRequest,
    ) -> Result<DecryptResponse, RemoteError> {
        self.prepare_decrypt(name, request)?.execute()
    }
}
