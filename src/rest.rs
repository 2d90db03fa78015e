//! JSON/HTTP surface of the key management service.
//!
//! Blobs are base64 strings, int64 checksums travel as JSON strings and every
//! field is nullable.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::backend::{AeadBackend, DecryptCall, DecryptReply, EncryptCall, EncryptReply};
use crate::config::{ConfigError, RestConfig};
use crate::error::RemoteError;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptRequest {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub plaintext: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "int64_string")]
    pub plaintext_crc32c: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub additional_authenticated_data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "int64_string")]
    pub additional_authenticated_data_crc32c: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EncryptResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub ciphertext: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "int64_string")]
    pub ciphertext_crc32c: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_plaintext_crc32c: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_additional_authenticated_data_crc32c: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection_level: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DecryptRequest {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub ciphertext: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "int64_string")]
    pub ciphertext_crc32c: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub additional_authenticated_data: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "int64_string")]
    pub additional_authenticated_data_crc32c: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DecryptResponse {
    /// `None` when the service decrypted to an empty plaintext.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_bytes")]
    pub plaintext: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "int64_string")]
    pub plaintext_crc32c: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_primary: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protection_level: Option<String>,
}

/// Client side of the HTTP service: `cryptoKeys.encrypt` and
/// `cryptoKeys.decrypt` on a key resource name.
#[async_trait]
pub trait CloudKmsRest: Send + Sync {
    async fn encrypt(&self, name: &str, request: EncryptRequest)
        -> Result<EncryptResponse, RemoteError>;

    async fn decrypt(&self, name: &str, request: DecryptRequest)
        -> Result<DecryptResponse, RemoteError>;
}

/// [`CloudKmsRest`] over `reqwest`.
#[derive(Clone, Debug)]
pub struct RestKmsClient {
    // client with oauth2 token
    http: reqwest::Client,
    base_url: Url,
}

impl RestKmsClient {
    pub fn new(config: &RestConfig) -> Result<Self, ConfigError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.access_token))
            .map_err(|_| ConfigError::InvalidToken)?;
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ConfigError::Client)?;

        Ok(Self::new_with_client(http, config.base_url.clone()))
    }

    /// Wraps a client that already carries its credentials.
    pub fn new_with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    async fn call<Req, Resp>(&self, name: &str, verb: &str, request: &Req) -> Result<Resp, RemoteError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Send,
    {
        let base = self.base_url.as_str().trim_end_matches('/');
        let endpoint = format!("{base}/v1/{name}:{verb}");
        tracing::debug!(%endpoint, "calling KMS");

        let response = self
            .http
            .post(&endpoint)
            .json(request)
            .send()
            .await
            .map_err(|source| RemoteError::Http {
                endpoint: endpoint.clone(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Status {
                endpoint,
                status,
                body,
            });
        }

        response.json::<Resp>().await.map_err(|e| {
            RemoteError::MalformedResponse(format!("{endpoint}: {e}"))
        })
    }
}

#[async_trait]
impl CloudKmsRest for RestKmsClient {
    async fn encrypt(
        &self,
        name: &str,
        request: EncryptRequest,
    ) -> Result<EncryptResponse, RemoteError> {
        self.call(name, "encrypt", &request).await
    }

    async fn decrypt(
        &self,
        name: &str,
        request: DecryptRequest,
    ) -> Result<DecryptResponse, RemoteError> {
        self.call(name, "decrypt", &request).await
    }
}

/// Runs [`crate::aead::KmsAead`] calls over a [`CloudKmsRest`].
#[derive(Clone)]
pub struct RestBackend {
    client: Arc<dyn CloudKmsRest>,
}

impl RestBackend {
    pub fn new(client: Arc<dyn CloudKmsRest>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AeadBackend for RestBackend {
    async fn encrypt(&self, call: EncryptCall) -> Result<EncryptReply, RemoteError> {
        let request = EncryptRequest {
            plaintext: Some(call.plaintext),
            plaintext_crc32c: call.plaintext_crc32c,
            additional_authenticated_data: Some(call.additional_authenticated_data),
            additional_authenticated_data_crc32c: call.additional_authenticated_data_crc32c,
        };
        let response = self.client.encrypt(&call.name, request).await?;
        tracing::debug!(
            name = ?response.name,
            protection_level = ?response.protection_level,
            "rest encrypt returned"
        );

        Ok(EncryptReply {
            name: response.name.unwrap_or_default(),
            ciphertext: response.ciphertext.unwrap_or_default(),
            ciphertext_crc32c: response.ciphertext_crc32c,
            verified_plaintext_crc32c: response.verified_plaintext_crc32c.unwrap_or(false),
            verified_additional_authenticated_data_crc32c: response
                .verified_additional_authenticated_data_crc32c
                .unwrap_or(false),
        })
    }

    async fn decrypt(&self, call: DecryptCall) -> Result<DecryptReply, RemoteError> {
        let request = DecryptRequest {
            ciphertext: Some(call.ciphertext),
            ciphertext_crc32c: call.ciphertext_crc32c,
            additional_authenticated_data: Some(call.additional_authenticated_data),
            additional_authenticated_data_crc32c: call.additional_authenticated_data_crc32c,
        };
        let response = self.client.decrypt(&call.name, request).await?;

        Ok(DecryptReply {
            plaintext: response.plaintext.unwrap_or_default(),
            plaintext_crc32c: response.plaintext_crc32c,
        })
    }
}

mod base64_bytes {
    use base64::{prelude::BASE64_STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(bytes) => serializer.serialize_str(&BASE64_STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| BASE64_STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// int64 fields are JSON strings on the wire; numbers are accepted on input.
mod int64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        match Option::<Repr>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Repr::Number(v)) => Ok(Some(v)),
            Some(Repr::Text(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}
