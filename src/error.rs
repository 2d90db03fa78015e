use crate::checksum::{ChecksumMismatch, Field};
use crate::rpc::CryptoKeyVersionAlgorithm;

/// Every failure an adapter can report. All of them are terminal for the call
/// that produced them.
#[derive(Debug, thiserror::Error)]
pub enum KmsError {
    #[error("invalid key name {name:?}: {reason}")]
    InvalidKeyName { name: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("the KMS GetPublicKey call failed for {name}")]
    KeyDescriptorUnavailable {
        name: String,
        #[source]
        source: RemoteError,
    },

    #[error("the data size {size} is larger than the allowed size: {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("the algorithm {0:?} does not support digests")]
    UnsupportedDigestAlgorithm(CryptoKeyVersionAlgorithm),

    #[error("the key name in the response ({actual:?}) does not match the requested key name ({expected:?})")]
    KeyNameMismatch { expected: String, actual: String },

    #[error("verifying the provided {0} checksum failed")]
    InputNotVerified(Field),

    #[error(transparent)]
    ChecksumMismatch(#[from] ChecksumMismatch),

    #[error("{operation} failed")]
    RemoteOperationFailed {
        operation: &'static str,
        #[source]
        source: RemoteError,
    },
}

/// Failures raised on the far side of a backend: transport errors from a
/// real client, or errors the service itself signals.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP request to {endpoint} failed")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("RPC failed with {code:?}: {message}")]
    Rpc { code: RpcCode, message: String },

    #[error("unknown key ID: {name} is not in {known:?}")]
    UnknownKey { name: String, known: Vec<String> },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid argument, {0}")]
    ChecksumMismatch(#[from] ChecksumMismatch),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("{0}")]
    Crypto(String),
}

/// Status codes an RPC backend can fail with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcCode {
    InvalidArgument,
    NotFound,
    PermissionDenied,
    FailedPrecondition,
    Unimplemented,
    Internal,
    Unavailable,
    Unknown,
}

impl RemoteError {
    pub fn rpc(code: RpcCode, message: impl Into<String>) -> Self {
        Self::Rpc {
            code,
            message: message.into(),
        }
    }
}
