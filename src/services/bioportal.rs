//! BioPortal search client.
//!
//! See: <https://data.bioontology.org/documentation#nav_search>

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::http::{DEFAULT_REQUEST_TIMEOUT, build_http, check_status};
use super::traits::ConceptSearch;
use crate::types::{ConceptResult, SearchRequest, score_confidence};
use crate::{OntomapError, Result};

/// Default base URL for the BioPortal REST API.
pub const DEFAULT_BASE_URL: &str = "https://data.bioontology.org";

/// Service name used for health tracking and cache keys.
pub const SERVICE_NAME: &str = "bioportal";

/// Client for the BioPortal search endpoint. Requires an API key.
#[derive(Clone)]
pub struct BioPortalClient {
    api_key: String,
    http: Client,
    base_url: String,
}

impl BioPortalClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(api_key, base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_options(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(OntomapError::Configuration(
                "BioPortal API key is empty".to_string(),
            ));
        }
        Ok(Self {
            api_key,
            http: build_http(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ConceptSearch for BioPortalClient {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<ConceptResult>> {
        let url = format!("{}/search", self.base_url);
        let mut params: Vec<(&str, String)> = vec![
            ("q", request.query.clone()),
            ("apikey", self.api_key.clone()),
            ("pagesize", request.max_results.to_string()),
            ("format", "json".to_string()),
        ];
        if !request.ontologies.is_empty() {
            let codes: Vec<String> = request
                .ontologies
                .iter()
                .map(|o| o.trim().to_uppercase())
                .filter(|o| !o.is_empty())
                .collect();
            params.push(("ontologies", codes.join(",")));
        }

        let response = self
            .http
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(|e| OntomapError::from_transport(SERVICE_NAME, e))?;

        check_status(SERVICE_NAME, &response)?;

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| OntomapError::from_transport(SERVICE_NAME, e))?;

        let results: Vec<ConceptResult> = body
            .collection
            .into_iter()
            .filter_map(|item| item.into_result(&request.query))
            .take(request.max_results)
            .collect();
        debug!(
            service = SERVICE_NAME,
            query = %request.query,
            count = results.len(),
            "search complete"
        );
        Ok(results)
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    collection: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    #[serde(rename = "@id", default)]
    id: Option<String>,
    #[serde(rename = "prefLabel", default)]
    pref_label: Option<String>,
    #[serde(default)]
    links: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    definition: Option<Vec<String>>,
    #[serde(default)]
    synonym: Option<Vec<String>>,
}

impl SearchItem {
    fn into_result(self, query: &str) -> Option<ConceptResult> {
        let uri = self.id.filter(|u| !u.is_empty())?;
        let label = self.pref_label.unwrap_or_default();
        let ontology = ontology_code(&self.links).unwrap_or_default();
        let synonyms = self.synonym.unwrap_or_default();
        let confidence = score_confidence(query, &label, &synonyms);

        let mut result = ConceptResult::new(label, uri, ontology, SERVICE_NAME)
            .synonyms(synonyms)
            .confidence(confidence);
        result.description = self
            .definition
            .and_then(|d| d.into_iter().next())
            .filter(|d| !d.is_empty());
        Some(result)
    }
}

/// Acronym from the `/ontologies/<CODE>` segment of the item's links.
/// The `ontology` link is preferred; any other link is a fallback.
fn ontology_code(links: &BTreeMap<String, serde_json::Value>) -> Option<String> {
    let preferred = links.get("ontology").into_iter();
    preferred
        .chain(links.values())
        .filter_map(|v| v.as_str())
        .find_map(|link| {
            let (_, rest) = link.split_once("/ontologies/")?;
            let code = rest.split('/').next()?;
            (!code.is_empty()).then(|| code.to_uppercase())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(
            BioPortalClient::new("  "),
            Err(OntomapError::Configuration(_))
        ));
    }

    #[test]
    fn ontology_from_links() {
        let links: BTreeMap<String, serde_json::Value> = serde_json::from_str(
            r#"{
                "children": "https://data.bioontology.org/ontologies/HP/classes/x/children",
                "ontology": "https://data.bioontology.org/ontologies/MONDO"
            }"#,
        )
        .unwrap();
        assert_eq!(ontology_code(&links).as_deref(), Some("MONDO"));
    }

    #[test]
    fn item_without_id_is_dropped() {
        let item: SearchItem = serde_json::from_str(r#"{"prefLabel": "Fatigue"}"#).unwrap();
        assert!(item.into_result("fatigue").is_none());
    }

    #[test]
    fn item_normalization() {
        let item: SearchItem = serde_json::from_str(
            r#"{
                "@id": "http://purl.obolibrary.org/obo/HP_0012378",
                "prefLabel": "Fatigue",
                "definition": ["A subjective feeling of tiredness."],
                "synonym": ["Tiredness"],
                "links": {"ontology": "https://data.bioontology.org/ontologies/HP"}
            }"#,
        )
        .unwrap();
        let result = item.into_result("tiredness").unwrap();
        assert_eq!(result.ontology_code, "HP");
        assert_eq!(result.source_service, "bioportal");
        assert_eq!(result.confidence_score, 0.9);
        assert_eq!(
            result.description.as_deref(),
            Some("A subjective feeling of tiredness.")
        );
    }
}
