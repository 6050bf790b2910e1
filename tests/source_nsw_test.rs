use fuelwatch::config::SourceConfig;
use fuelwatch::error::{FetchFailureKind, FuelWatchError};
use fuelwatch::fuel::PriceKey;
use fuelwatch::source::{NswFuelClient, PriceSource};
use serde_json::json;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer, api_key: &str) -> NswFuelClient {
    let cfg = SourceConfig {
        base_url: server.uri(),
        api_key: api_key.to_string(),
        timeout_secs: 5,
    };
    NswFuelClient::new(&cfg).unwrap()
}

fn kind_of(err: FuelWatchError) -> FetchFailureKind {
    match err {
        FuelWatchError::SourceFetch { kind, .. } => kind,
        other => panic!("expected a fetch error, got {other:?}"),
    }
}

#[tokio::test]
async fn fetch_builds_snapshot_from_prices_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/prices"))
        .and(header("apikey", "secret"))
        .and(header_exists("transactionid"))
        .and(header_exists("requesttimestamp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "stations": [
                {"code": "350", "name": "Metro Ryde", "address": "1 Main St, Ryde", "brand": "Metro"},
                {"code": 17, "name": "Budget Parramatta", "address": "2 Church St"}
            ],
            "prices": [
                {"stationcode": "350", "fueltype": "E10", "price": 150.9, "lastupdated": "14/07/2024 09:15:00 AM"},
                {"stationcode": "350", "fueltype": "P98", "price": 165.0},
                {"stationcode": 17, "fueltype": "U91", "price": 158.4}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = client_for(&server, "secret").fetch().await.unwrap();
    assert_eq!(snapshot.stations.len(), 2);
    assert_eq!(snapshot.station(350).unwrap().name, "Metro Ryde");
    assert_eq!(snapshot.station(17).unwrap().brand, None);

    let e10 = snapshot.price(&PriceKey::new(350, "E10")).unwrap();
    assert_eq!(e10.price, 150.9);
    assert!(e10.last_updated.is_some());
    assert_eq!(snapshot.price(&PriceKey::new(17, "U91")).unwrap().price, 158.4);
    assert!(snapshot.price(&PriceKey::new(17, "E10")).is_none());
}

#[tokio::test]
async fn error_status_is_a_source_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/prices"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let err = client_for(&server, "").fetch().await.unwrap_err();
    assert!(err.to_string().contains("500"));
    assert_eq!(kind_of(err), FetchFailureKind::Source);
}

#[tokio::test]
async fn error_details_body_is_a_source_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/prices"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errorDetails": {"code": "E0401", "message": "Invalid API key"}
        })))
        .mount(&server)
        .await;

    let err = client_for(&server, "wrong").fetch().await.unwrap_err();
    assert!(err.to_string().contains("Invalid API key"));
    assert_eq!(kind_of(err), FetchFailureKind::Source);
}

#[tokio::test]
async fn malformed_body_is_unexpected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/prices"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server, "").fetch().await.unwrap_err();
    assert_eq!(kind_of(err), FetchFailureKind::Unexpected);
}

#[tokio::test]
async fn unreachable_host_is_unexpected() {
    let server = MockServer::start().await;
    let client = client_for(&server, "");
    drop(server);

    let err = client.fetch().await.unwrap_err();
    assert_eq!(kind_of(err), FetchFailureKind::Unexpected);
}
