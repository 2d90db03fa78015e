mod common;

use std::sync::Arc;

use base64::{prelude::BASE64_STANDARD, Engine};
use common::{init_tracing, KEY_ID};
use kms_integrity::checksum::{self, Field};
use kms_integrity::rest::{CloudKmsRest, DecryptRequest, EncryptRequest};
use kms_integrity::{Aead, KmsAead, KmsError, RemoteError, RestConfig, RestKmsClient};
use serde_json::json;
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "test-token";

fn client_for(server: &MockServer) -> RestKmsClient {
    let config = RestConfig {
        base_url: Url::parse(&server.uri()).unwrap(),
        access_token: TOKEN.into(),
        timeout_secs: 5,
    };
    RestKmsClient::new(&config).unwrap()
}

fn endpoint(verb: &str) -> String {
    format!("/v1/{KEY_ID}:{verb}")
}

fn b64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

#[tokio::test]
async fn encrypt_posts_to_the_key_with_bearer_token() {
    init_tracing();
    let server = MockServer::start().await;
    let ciphertext = b"opaque ciphertext";

    Mock::given(method("POST"))
        .and(path(endpoint("encrypt")))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .and(body_json(json!({
            "plaintext": b64(b"plaintext"),
            "plaintextCrc32c": checksum::compute(b"plaintext").to_string(),
            "additionalAuthenticatedData": b64(b"ad"),
            "additionalAuthenticatedDataCrc32c": checksum::compute(b"ad").to_string()
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": format!("{KEY_ID}/cryptoKeyVersions/1"),
            "ciphertext": b64(ciphertext),
            "ciphertextCrc32c": checksum::compute(ciphertext).to_string(),
            "verifiedPlaintextCrc32c": true,
            "verifiedAdditionalAuthenticatedDataCrc32c": true,
            "protectionLevel": "HSM"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let response = client_for(&server)
        .encrypt(
            KEY_ID,
            EncryptRequest {
                plaintext: Some(b"plaintext".to_vec()),
                plaintext_crc32c: Some(checksum::compute(b"plaintext")),
                additional_authenticated_data: Some(b"ad".to_vec()),
                additional_authenticated_data_crc32c: Some(checksum::compute(b"ad")),
            },
        )
        .await
        .unwrap();

    assert_eq!(response.ciphertext.as_deref(), Some(&ciphertext[..]));
    assert_eq!(response.ciphertext_crc32c, Some(checksum::compute(ciphertext)));
    assert_eq!(response.verified_plaintext_crc32c, Some(true));
    assert_eq!(response.protection_level.as_deref(), Some("HSM"));
}

#[tokio::test]
async fn decrypt_accepts_numeric_checksums_and_missing_plaintext() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(endpoint("decrypt")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "plaintextCrc32c": 0,
            "usedPrimary": true
        })))
        .mount(&server)
        .await;

    let response = client_for(&server)
        .decrypt(
            KEY_ID,
            DecryptRequest {
                ciphertext: Some(b"ciphertext".to_vec()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(response.plaintext, None);
    assert_eq!(response.plaintext_crc32c, Some(0));
    assert_eq!(response.used_primary, Some(true));
}

#[tokio::test]
async fn error_status_is_reported_with_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(endpoint("encrypt")))
        .respond_with(ResponseTemplate::new(403).set_body_string("permission denied"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .encrypt(KEY_ID, EncryptRequest::default())
        .await
        .unwrap_err();
    match err {
        RemoteError::Status {
            endpoint,
            status,
            body,
        } => {
            assert!(endpoint.ends_with(":encrypt"));
            assert_eq!(status, 403);
            assert_eq!(body, "permission denied");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn malformed_body_is_reported() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(endpoint("decrypt")))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = client_for(&server)
        .decrypt(KEY_ID, DecryptRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::MalformedResponse(_)));
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let config = RestConfig {
        base_url: Url::parse("http://127.0.0.1:1/").unwrap(),
        access_token: TOKEN.into(),
        timeout_secs: 2,
    };
    let client = RestKmsClient::new(&config).unwrap();

    let err = client
        .encrypt(KEY_ID, EncryptRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RemoteError::Http { .. }));
}

#[test]
fn token_must_be_a_valid_header() {
    let config = RestConfig::new("bad\ntoken").unwrap();
    assert!(RestKmsClient::new(&config).is_err());
}

async fn mount_service(server: &MockServer, ciphertext: &[u8], plaintext_crc32c: i64) {
    Mock::given(method("POST"))
        .and(path(endpoint("encrypt")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": format!("{KEY_ID}/cryptoKeyVersions/1"),
            "ciphertext": b64(ciphertext),
            "ciphertextCrc32c": checksum::compute(ciphertext).to_string(),
            "verifiedPlaintextCrc32c": true,
            "verifiedAdditionalAuthenticatedDataCrc32c": true
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(endpoint("decrypt")))
        .and(body_json(json!({
            "ciphertext": b64(ciphertext),
            "ciphertextCrc32c": checksum::compute(ciphertext).to_string(),
            "additionalAuthenticatedData": b64(b"ad"),
            "additionalAuthenticatedDataCrc32c": checksum::compute(b"ad").to_string()
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "plaintext": b64(b"plaintext"),
            "plaintextCrc32c": plaintext_crc32c.to_string()
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn kms_aead_over_http() {
    let server = MockServer::start().await;
    mount_service(&server, b"opaque ciphertext", checksum::compute(b"plaintext")).await;

    let aead = KmsAead::builder()
        .key_name(KEY_ID)
        .rest_client(Arc::new(client_for(&server)))
        .build()
        .unwrap();

    let ciphertext = aead.encrypt(b"plaintext", b"ad").await.unwrap();
    assert_eq!(ciphertext, b"opaque ciphertext");
    assert_eq!(aead.decrypt(&ciphertext, b"ad").await.unwrap(), b"plaintext");
}

#[tokio::test]
async fn kms_aead_over_http_rejects_corrupted_plaintext() {
    let server = MockServer::start().await;
    mount_service(&server, b"opaque ciphertext", 1).await;

    let aead = KmsAead::builder()
        .key_name(KEY_ID)
        .rest_client(Arc::new(client_for(&server)))
        .build()
        .unwrap();

    let err = aead.decrypt(b"opaque ciphertext", b"ad").await.unwrap_err();
    assert!(matches!(
        err,
        KmsError::ChecksumMismatch(ref mismatch) if mismatch.field == Field::Plaintext
    ));
}
