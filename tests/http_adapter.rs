//! HTTP adapter tests against a mock server.
//!
//! Run with: `cargo test --test http_adapter`

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use client_sync::{ClientsApi, HttpClientsApi, RetryConfig, TransportError, ViewKind, Watermark};

fn api(server: &MockServer) -> HttpClientsApi {
    HttpClientsApi::new(server.uri(), Duration::from_secs(2))
        .unwrap()
        .with_retry(RetryConfig::none())
}

#[tokio::test]
async fn by_city_sends_filter_and_flattens() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clients/by-city"))
        .and(query_param("frequentOnly", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "totalClients": 2,
            "data": {
                "Laval": { "districts": { "Chomedey": [{ "_id": "a", "firstName": "Ana" }] } },
                "Rive Nord": { "cities": { "Terrebonne": { "clients": [{ "_id": "b" }] } } }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = api(&server).by_city(true).await.unwrap();
    let mut records = snapshot.into_records();
    records.sort_by(|a, b| a.id.cmp(&b.id));

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].first_name, "Ana");
    assert_eq!(records[0].index_district(), Some("Chomedey"));
    assert_eq!(records[1].city, "Terrebonne");
}

#[tokio::test]
async fn changes_since_passes_watermark() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clients/by-city-changes"))
        .and(query_param("since", "2026-03-01T10:00:00.000Z"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "hasChanges": true,
            "lastUpdate": "2026-03-01T10:05:00.000Z",
            "clientsForByCity": [{ "_id": "a", "city": "Laval", "district": "Vimont" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let since = Watermark::from_server("2026-03-01T10:00:00.000Z").unwrap();
    let changes = api(&server).changes_since(&since).await.unwrap();

    assert!(changes.has_changes);
    assert_eq!(changes.last_update.as_ref().unwrap().as_str(), "2026-03-01T10:05:00.000Z");
    assert_eq!(changes.upserts().unwrap()[0].index_district(), Some("Vimont"));
}

#[tokio::test]
async fn for_map_ids_cover_missing_clients() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clients/for-map"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "clients": [{ "_id": "a", "city": "Laval", "lat": 45.57, "lng": -73.75 }],
            "totalWithCoordinates": 1,
            "withoutCoordinates": 1,
            "missingClients": [{ "_id": "b", "name": "Sans adresse" }]
        })))
        .mount(&server)
        .await;

    let ids = api(&server).authoritative_ids(ViewKind::Map, false).await.unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains("b"));
}

#[tokio::test]
async fn last_update_absent_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clients/last-update"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "lastUpdate": null })))
        .mount(&server)
        .await;

    assert!(api(&server).last_update().await.unwrap().is_none());
}

#[tokio::test]
async fn unsuccessful_envelope_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clients/last-update"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": false, "message": "db down" })))
        .mount(&server)
        .await;

    let err = api(&server).last_update().await.unwrap_err();
    assert!(matches!(err, TransportError::Unsuccessful { ref message, .. } if message == "db down"));
}

#[tokio::test]
async fn http_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clients/by-city"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = api(&server).by_city(false).await.unwrap_err();
    assert_eq!(err, TransportError::Status { endpoint: "/clients/by-city".into(), status: 503 });
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clients/for-map"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = api(&server).for_map(false).await.unwrap_err();
    assert_eq!(err.kind(), "decode");
}

#[tokio::test]
async fn reads_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clients/last-update"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/clients/last-update"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "lastUpdate": "T1" })))
        .mount(&server)
        .await;

    let api = api(&server).with_retry(fast_retry());

    assert_eq!(api.last_update().await.unwrap().unwrap().as_str(), "T1");
}

fn fast_retry() -> RetryConfig {
    RetryConfig {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        factor: 2.0,
        max_attempts: 3,
    }
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clients/by-city"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = api(&server).with_retry(fast_retry()).by_city(false).await.unwrap_err();
    assert!(matches!(err, TransportError::Status { status: 404, .. }));
}

#[tokio::test]
async fn decode_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clients/for-map"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let err = api(&server).with_retry(fast_retry()).for_map(false).await.unwrap_err();
    assert_eq!(err.kind(), "decode");
}

#[tokio::test]
async fn server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clients/last-update"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let err = api(&server).with_retry(fast_retry()).last_update().await.unwrap_err();
    assert!(matches!(err, TransportError::Status { status: 502, .. }));
}

#[tokio::test]
async fn correction_posts_body_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/clients/update-single-client"))
        .and(body_json(json!({ "clientId": "a", "newAddress": "8000 boul. Taschereau, Brossard" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "client": { "_id": "a", "city": "Laval", "district": "Chomedey", "address": "8000 boul. Taschereau, Brossard" },
            "location": { "sector": "Rive Sud", "city": "Brossard" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let corrected = api(&server)
        .update_single_client("a", "8000 boul. Taschereau, Brossard")
        .await
        .unwrap();
    let record = corrected.into_record();

    assert_eq!(record.city, "Brossard");
    assert_eq!(record.sector.as_deref(), Some("Rive Sud"));
    assert!(record.district.is_none());
}

#[tokio::test]
async fn correction_failure_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/clients/update-single-client"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server).with_retry(RetryConfig::query());
    let err = api.update_single_client("a", "1 rue X").await.unwrap_err();
    assert!(matches!(err, TransportError::Status { status: 500, .. }));
}
