//! Key directory tests using wiremock.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use sip_attestation::{
    AttestationDecoder, DecodeFailure, DecodeParams, DecoderConfig, KeyResolutionError,
    MAX_KEY_BODY_BYTES, VerifyOverrides,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY_ID: &str = "k4.pid.2uab3h18sgaYX1PKFW3OIMvGIfAMnuwWBJ6TuCbuwQii";
const KEY_PUBKEY: &str = "k4.public.f2AxH__c3AQy_abwIYAZvwzLYrLPAUNH5o6cFzPj1_0";
const KEY_PATH: &str = "/v4/k4.pid.2uab3h18sgaYX1PKFW3OIMvGIfAMnuwWBJ6TuCbuwQii";

const TOKEN_AUTHENTIC: &str = "v4.public.eyJhdWQiOiJleGFtcGxlLmNvbSIsImV4cCI6IjIwMzAtMDEtMDFUMDA6MDA6MDBaIiwiaWF0IjoiMjAyMy0wNC0yMFQxNjo1NDowMVoiLCJqdGkiOiJmOGIxZDdmNzNiNzEzYWY0M2FkNTllMzNiN2MwMmRmNSIsInJlc3VsdCI6IkFVVEhFTlRJQyIsInNsaWQiOiJaNDVKQkpSNlM5IiwibG9jYXRpb24iOnsibGF0Ijo0Ny43OTQ2LCJsb24iOjEyLjk4NjR9LCJleHRyZWZzIjpbImZvbyIseyJiYXIiOiJiYXoifSwxMjNdffeoKRK7wfueWl9ti4h9JTYM2ZOXOPgHMOq-6eRxFEKFUYz1LLcNxUp9JtHHY-FD5pHxP9OQ9nOg_izxMwK3GgU.eyJraWQiOiAiazQucGlkLjJ1YWIzaDE4c2dhWVgxUEtGVzNPSU12R0lmQU1udXdXQko2VHVDYnV3UWlpIn0";
const TOKEN_COUNTERFEIT: &str = "v4.public.eyJhdWQiOiAiZXhhbXBsZS5jb20iLCAianRpIjogIjJhZTBmOTIxZWNhZjJiYjNlNjg5ZTBkMDUxYjUwYzhiIiwgInJlc3VsdCI6ICJDT1VOVEVSRkVJVCIsICJzbGlkIjogIlo0NUpCSlI2UzkiLCAibG9jYXRpb24iOiB7ImxhdCI6IDQ3Ljc5NDYsICJsb24iOiAxMi45ODY0fSwgImV4dHJlZnMiOiBbImZvbyIsIHsiYmFyIjogImJheiJ9LCAxMjNdLCAiaWF0IjogIjIwMjQtMDQtMThUMDc6MzQ6NDIuMzM4OTcwWiIsICJleHAiOiAiMjAyNC0wOS0xN1QwOTozNDo0Mi4zMzg5NzBaIn2KSrNg7Dhf_6F7t028ZITRD6BrIO-J1VO3zLEPkP4Mx9g4QOEOf5WpPK-rNiglkxqmWwcM7ah4wrm7CGkca9UM.eyJraWQiOiAiazQucGlkLjJ1YWIzaDE4c2dhWVgxUEtGVzNPSU12R0lmQU1udXdXQko2VHVDYnV3UWlpIn0";

fn may_2024() -> VerifyOverrides {
    VerifyOverrides::new().now(Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap())
}

fn decoder_for(server: &MockServer) -> AttestationDecoder {
    AttestationDecoder::with_config(
        DecoderConfig::new()
            .with_key_directory_url(format!("{}/v4", server.uri()))
            .with_request_timeout(Duration::from_secs(2)),
    )
    .unwrap()
}

async fn decode(
    decoder: &AttestationDecoder,
    token: &str,
) -> Result<sip_attestation::Attestation, sip_attestation::AttestationError> {
    decoder
        .decode_with(token, DecodeParams::default(), &may_2024())
        .await
}

#[tokio::test]
async fn fetches_key_once_and_caches_it() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(KEY_PUBKEY))
        .expect(1)
        .mount(&server)
        .await;
    let decoder = decoder_for(&server);

    let authentic = decode(&decoder, TOKEN_AUTHENTIC).await.unwrap();
    let counterfeit = decode(&decoder, TOKEN_COUNTERFEIT).await.unwrap();

    assert!(authentic.is_authenticated());
    assert!(counterfeit.is_fraud());
    assert!(decoder.has_key(KEY_ID));
}

#[tokio::test]
async fn trailing_whitespace_in_key_body_is_ignored() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{KEY_PUBKEY}\n")))
        .mount(&server)
        .await;
    let decoder = decoder_for(&server);

    decode(&decoder, TOKEN_AUTHENTIC).await.unwrap();
}

#[tokio::test]
async fn registered_key_is_never_fetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;
    let decoder = decoder_for(&server);
    decoder.register_key(KEY_ID, KEY_PUBKEY);

    decode(&decoder, TOKEN_AUTHENTIC).await.unwrap();
}

#[tokio::test]
async fn unknown_key_fails_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEY_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    let decoder = decoder_for(&server);

    let err = decode(&decoder, TOKEN_AUTHENTIC).await.unwrap_err();

    assert!(matches!(
        err.failure(),
        DecodeFailure::KeyResolution(KeyResolutionError::Status { status: 404, .. })
    ));
    assert!(!decoder.has_key(KEY_ID));
}

#[tokio::test]
async fn server_error_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEY_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(KEY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(KEY_PUBKEY))
        .expect(1)
        .mount(&server)
        .await;
    let decoder = decoder_for(&server);

    let err = decode(&decoder, TOKEN_AUTHENTIC).await.unwrap_err();
    assert!(matches!(
        err.failure(),
        DecodeFailure::KeyResolution(KeyResolutionError::Status { status: 500, .. })
    ));

    decode(&decoder, TOKEN_AUTHENTIC).await.unwrap();
}

#[tokio::test]
async fn non_key_body_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;
    let decoder = decoder_for(&server);

    let err = decode(&decoder, TOKEN_AUTHENTIC).await.unwrap_err();

    assert!(matches!(
        err.failure(),
        DecodeFailure::KeyResolution(KeyResolutionError::InvalidBody { .. })
    ));
    assert!(decoder.redeemed_at("f8b1d7f73b713af43ad59e33b7c02df5").is_none());
}

#[tokio::test]
async fn unreachable_directory_is_a_network_failure() {
    let decoder = AttestationDecoder::with_config(
        DecoderConfig::new()
            .with_key_directory_url("http://127.0.0.1:9/v4")
            .with_request_timeout(Duration::from_secs(2)),
    )
    .unwrap();

    let err = decode(&decoder, TOKEN_AUTHENTIC).await.unwrap_err();

    assert!(matches!(
        err.failure(),
        DecodeFailure::KeyResolution(KeyResolutionError::Network { .. })
    ));
}

#[tokio::test]
async fn development_directory_serves_developer_keys() {
    let production = MockServer::start().await;
    let development = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(0)
        .mount(&production)
        .await;
    Mock::given(method("GET"))
        .and(path(KEY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(KEY_PUBKEY))
        .expect(1)
        .mount(&development)
        .await;
    let decoder = AttestationDecoder::with_config(
        DecoderConfig::new()
            .with_key_directory_url(format!("{}/v4", production.uri()))
            .with_development_key_directory_url(format!("{}/v4", development.uri())),
    )
    .unwrap();

    decoder.use_development_key_directory();
    decode(&decoder, TOKEN_AUTHENTIC).await.unwrap();

    assert_eq!(
        decoder.key_directory_url().as_str(),
        format!("{}/v4", development.uri())
    );
}

#[tokio::test]
async fn clear_caches_refetches_keys() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(KEY_PUBKEY))
        .expect(2)
        .mount(&server)
        .await;
    let decoder = decoder_for(&server);

    decode(&decoder, TOKEN_AUTHENTIC).await.unwrap();
    decoder.clear_caches();
    decode(&decoder, TOKEN_AUTHENTIC).await.unwrap();
}

#[tokio::test]
async fn redirects_are_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEY_PATH))
        .respond_with(
            ResponseTemplate::new(302)
                .insert_header("Location", format!("{}/elsewhere", server.uri()).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/elsewhere"))
        .respond_with(ResponseTemplate::new(200).set_body_string(KEY_PUBKEY))
        .expect(0)
        .mount(&server)
        .await;
    let decoder = decoder_for(&server);

    let err = decode(&decoder, TOKEN_AUTHENTIC).await.unwrap_err();

    assert!(matches!(
        err.failure(),
        DecodeFailure::KeyResolution(KeyResolutionError::Status { status: 302, .. })
    ));
}

#[tokio::test]
async fn oversized_key_body_is_rejected() {
    let server = MockServer::start().await;
    let body = format!("{KEY_PUBKEY}{}", " ".repeat(MAX_KEY_BODY_BYTES));
    Mock::given(method("GET"))
        .and(path(KEY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    let decoder = decoder_for(&server);

    let err = decode(&decoder, TOKEN_AUTHENTIC).await.unwrap_err();

    assert!(matches!(
        err.failure(),
        DecodeFailure::KeyResolution(KeyResolutionError::InvalidBody { reason, .. })
            if reason.contains("exceeds")
    ));
    assert!(!decoder.has_key(KEY_ID));
}
