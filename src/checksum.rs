//! CRC32C checksums attached to every payload field that crosses the wire.
//!
//! Checksums travel as `Option<i64>`: the unsigned 32-bit CRC zero-extended to
//! the int64 both transports use. `None` means "not supplied" and is distinct
//! from a checksum of zero.

use std::fmt;

/// Payload fields that carry their own checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Plaintext,
    Ciphertext,
    AdditionalAuthenticatedData,
    Data,
    Digest,
    Signature,
    PublicKeyPem,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::Plaintext => "plaintext",
            Field::Ciphertext => "ciphertext",
            Field::AdditionalAuthenticatedData => "additional authenticated data",
            Field::Data => "data",
            Field::Digest => "digest",
            Field::Signature => "signature",
            Field::PublicKeyPem => "public key PEM",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} checksum mismatch (declared {declared:?}, computed {computed})")]
pub struct ChecksumMismatch {
    pub field: Field,
    pub declared: Option<i64>,
    pub computed: i64,
}

/// Outcome of a successful [`verify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// Payload or expected value was absent, nothing to check.
    Skipped,
    Verified,
}

/// Checksum of an outgoing payload. Empty payloads get the checksum of the
/// empty sequence.
pub fn compute(payload: &[u8]) -> i64 {
    i64::from(::crc32c::crc32c(payload))
}

/// Checks `payload` against a caller-supplied checksum, skipping when either
/// side is absent.
pub fn verify(
    payload: Option<&[u8]>,
    expected: Option<i64>,
    field: Field,
) -> Result<Verification, ChecksumMismatch> {
    let (Some(payload), Some(expected)) = (payload, expected) else {
        return Ok(Verification::Skipped);
    };
    let computed = compute(payload);
    if computed != expected {
        return Err(ChecksumMismatch {
            field,
            declared: Some(expected),
            computed,
        });
    }
    Ok(Verification::Verified)
}

/// Response-side check: the service must declare a checksum and it must
/// match what we received.
pub fn expect(payload: &[u8], declared: Option<i64>, field: Field) -> Result<(), ChecksumMismatch> {
    let computed = compute(payload);
    if declared != Some(computed) {
        return Err(ChecksumMismatch {
            field,
            declared,
            computed,
        });
    }
    Ok(())
}
