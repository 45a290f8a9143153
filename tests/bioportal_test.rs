//! Wiremock integration tests for BioPortalClient.

use std::time::Duration;

use ontomap::{BioPortalClient, ConceptSearch, OntomapError, SearchRequest};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn search_body() -> serde_json::Value {
    serde_json::json!({
        "collection": [
            {
                "@id": "http://purl.obolibrary.org/obo/MONDO_0100233",
                "prefLabel": "long COVID-19",
                "synonym": ["post-acute COVID-19 syndrome", "long covid"],
                "definition": ["A condition that persists after acute infection."],
                "links": {"ontology": "https://data.bioontology.org/ontologies/MONDO"}
            },
            {
                "@id": "http://purl.bioontology.org/ontology/SNOMEDCT/1119303003",
                "prefLabel": "Post-acute COVID-19",
                "links": {"ontology": "https://data.bioontology.org/ontologies/SNOMEDCT"}
            },
            {
                "prefLabel": "no id, dropped"
            }
        ]
    })
}

#[tokio::test]
async fn test_search_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "long covid"))
        .and(query_param("apikey", "test_key"))
        .and(query_param("pagesize", "5"))
        .and(query_param("format", "json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = BioPortalClient::with_base_url("test_key", mock_server.uri()).unwrap();
    let results = client
        .search(&SearchRequest::new("long covid"))
        .await
        .expect("search should succeed");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].label, "long COVID-19");
    assert_eq!(results[0].ontology_code, "MONDO");
    assert_eq!(results[0].source_service, "bioportal");
    assert_eq!(results[0].confidence_score, 0.9);
    assert!(results[0].description.is_some());
    assert_eq!(results[1].ontology_code, "SNOMEDCT");
    assert!(results[1].synonyms.is_empty());
}

#[tokio::test]
async fn test_search_sends_ontology_filter() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("ontologies", "MONDO,HP"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = BioPortalClient::with_base_url("test_key", mock_server.uri()).unwrap();
    let request = SearchRequest::new("long covid").ontologies(["mondo", "HP"]);
    client.search(&request).await.expect("search should succeed");
}

#[tokio::test]
async fn test_search_truncates_to_max_results() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(search_body()))
        .mount(&mock_server)
        .await;

    let client = BioPortalClient::with_base_url("test_key", mock_server.uri()).unwrap();
    let results = client
        .search(&SearchRequest::new("long covid").max_results(1))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
}

#[tokio::test]
async fn test_empty_collection() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&mock_server)
        .await;

    let client = BioPortalClient::with_base_url("test_key", mock_server.uri()).unwrap();
    let results = client.search(&SearchRequest::new("zzzz")).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_unauthorized() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid apikey"))
        .mount(&mock_server)
        .await;

    let client = BioPortalClient::with_base_url("bad_key", mock_server.uri()).unwrap();
    let err = client.search(&SearchRequest::new("fatigue")).await.unwrap_err();
    assert!(
        matches!(err, OntomapError::AuthenticationFailed { ref service } if service == "bioportal"),
        "{err:?}"
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_rate_limited_with_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&mock_server)
        .await;

    let client = BioPortalClient::with_base_url("test_key", mock_server.uri()).unwrap();
    let err = client.search(&SearchRequest::new("fatigue")).await.unwrap_err();
    assert!(matches!(err, OntomapError::RateLimited { .. }), "{err:?}");
    assert_eq!(err.retry_after(), Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock_server)
        .await;

    let client = BioPortalClient::with_base_url("test_key", mock_server.uri()).unwrap();
    let err = client.search(&SearchRequest::new("fatigue")).await.unwrap_err();
    assert!(matches!(err, OntomapError::ServiceUnavailable { .. }), "{err:?}");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_malformed_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&mock_server)
        .await;

    let client = BioPortalClient::with_base_url("test_key", mock_server.uri()).unwrap();
    let err = client.search(&SearchRequest::new("fatigue")).await.unwrap_err();
    assert!(matches!(err, OntomapError::InvalidResponse(_)), "{err:?}");
}

#[tokio::test]
async fn test_request_timeout() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(search_body())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&mock_server)
        .await;

    let client = BioPortalClient::with_options(
        "test_key",
        mock_server.uri(),
        Duration::from_millis(100),
    )
    .unwrap();
    let err = client.search(&SearchRequest::new("fatigue")).await.unwrap_err();
    assert!(matches!(err, OntomapError::Timeout(_)), "{err:?}");
}
