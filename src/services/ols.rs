//! EBI Ontology Lookup Service (OLS) search client.
//!
//! OLS uses its own lowercase ontology identifiers. Callers pass BioPortal
//! acronyms; the client translates them through an [`OntologyMap`] and
//! drops codes it has no mapping for.

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

/// Default base URL for the OLS API.
pub const DEFAULT_BASE_URL: &str = "https://www.ebi.ac.uk/ols/api";

/// Service name used for health tracking and cache keys.
pub const SERVICE_NAME: &str = "ols";

/// BioPortal acronym (upper-case) → OLS ontology id.
pub type OntologyMap = BTreeMap<String, String>;

/// Mapping for the ontologies both services commonly serve.
pub fn default_ontology_map() -> OntologyMap {
    [
        ("MONDO", "mondo"),
        ("HP", "hp"),
        ("GO", "go"),
        ("CHEBI", "chebi"),
        ("NCIT", "ncit"),
        ("DOID", "doid"),
        ("SYMP", "symp"),
        ("PRO", "pr"),
    ]
    .into_iter()
    .map(|(bp, ols)| (bp.to_string(), ols.to_string()))
    .collect()
}

/// Client for the OLS search endpoint. No credentials required.
#[derive(Clone)]
pub struct OlsClient {
    http: Client,
    base_url: String,
    ontology_map: OntologyMap,
}

impl OlsClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(base_url, DEFAULT_REQUEST_TIMEOUT, default_ontology_map())
    }

    pub fn with_options(
        base_url: impl Into<String>,
        timeout: Duration,
        ontology_map: OntologyMap,
    ) -> Result<Self> {
        let ontology_map = ontology_map
            .into_iter()
            .map(|(bp, ols)| (bp.trim().to_uppercase(), ols))
            .collect();
        Ok(Self {
            http: build_http(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ontology_map,
        })
    }

    /// Translate BioPortal acronyms to OLS ids. Unmapped codes are dropped;
    /// `None` means no ontology filter should be sent.
    pub fn map_ontologies(&self, ontologies: &[String]) -> Option<String> {
        let mapped: Vec<&str> = ontologies
            .iter()
            .filter_map(|o| self.ontology_map.get(&o.trim().to_uppercase()))
            .map(String::as_str)
            .collect();
        (!mapped.is_empty()).then(|| mapped.join(","))
    }
}

#[async_trait]
impl ConceptSearch for OlsClient {
    fn name(&self) -> &str {
        SERVICE_NAME
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<ConceptResult>> {
        let url = format!("{}/search", self.base_url);
        let mut params: Vec<(&str, String)> = vec![
            ("q", request.query.clone()),
            ("rows", request.max_results.to_string()),
            ("format", "json".to_string()),
        ];
        if let Some(ontology) = self.map_ontologies(&request.ontologies) {
            params.push(("ontology", ontology));
        } else if !request.ontologies.is_empty() {
            debug!(
                service = SERVICE_NAME,
                ontologies = ?request.ontologies,
                "no OLS mapping for requested ontologies, searching all"
            );
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
            .response
            .docs
            .into_iter()
            .filter_map(|doc| doc.into_result(&request.query))
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
    response: SearchBody,
}

#[derive(Deserialize, Default)]
struct SearchBody {
    #[serde(default)]
    docs: Vec<SearchDoc>,
}

#[derive(Deserialize)]
struct SearchDoc {
    #[serde(default)]
    iri: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    ontology_name: Option<String>,
    #[serde(default)]
    description: Option<Vec<String>>,
    #[serde(default)]
    synonym: Option<Vec<String>>,
}

impl SearchDoc {
    fn into_result(self, query: &str) -> Option<ConceptResult> {
        let uri = self.iri.filter(|u| !u.is_empty())?;
        let label = self.label.unwrap_or_default();
        let ontology = self.ontology_name.unwrap_or_default().to_uppercase();
        let synonyms = self.synonym.unwrap_or_default();
        let confidence = score_confidence(query, &label, &synonyms);

        let mut result = ConceptResult::new(label, uri, ontology, SERVICE_NAME)
            .synonyms(synonyms)
            .confidence(confidence);
        result.description = self
            .description
            .and_then(|d| d.into_iter().next())
            .filter(|d| !d.is_empty());
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ontology_mapping_drops_unknown_codes() {
        let client = OlsClient::new().unwrap();
        let codes = vec!["mondo".to_string(), "XYZ".to_string(), "PRO".to_string()];
        assert_eq!(client.map_ontologies(&codes).as_deref(), Some("mondo,pr"));
        assert_eq!(client.map_ontologies(&["XYZ".to_string()]), None);
        assert_eq!(client.map_ontologies(&[]), None);
    }

    #[test]
    fn custom_map_keys_are_normalized() {
        let map = OntologyMap::from([("efo ".to_string(), "efo".to_string())]);
        let client = OlsClient::with_options(DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT, map).unwrap();
        assert_eq!(client.map_ontologies(&["EFO".to_string()]).as_deref(), Some("efo"));
    }

    #[test]
    fn doc_normalization() {
        let doc: SearchDoc = serde_json::from_str(
            r#"{
                "iri": "http://purl.obolibrary.org/obo/MONDO_0100233",
                "label": "long COVID",
                "ontology_name": "mondo",
                "description": ["A condition following SARS-CoV-2 infection."]
            }"#,
        )
        .unwrap();
        let result = doc.into_result("Long COVID").unwrap();
        assert_eq!(result.ontology_code, "MONDO");
        assert_eq!(result.confidence_score, 1.0);
        assert!(result.synonyms.is_empty());
    }
}
