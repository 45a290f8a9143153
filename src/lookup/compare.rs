//! Cross-service comparison of search results.

use std::collections::BTreeMap;

use crate::types::{Comparison, ConceptGroup, ConceptResult, Discrepancy, ServiceMatch};

/// Compare per-service results for `concept`.
///
/// `results` holds one entry per service that answered, in any order.
/// Results are grouped by normalized label; results with an empty label
/// are counted but not grouped. Count and single-source discrepancies are
/// only meaningful with two or more answering services and are not
/// reported otherwise.
pub fn compare_results(concept: &str, results: &[(String, Vec<ConceptResult>)]) -> Comparison {
    let counts: BTreeMap<String, usize> = results
        .iter()
        .map(|(service, r)| (service.clone(), r.len()))
        .collect();

    let mut by_label: BTreeMap<String, ConceptGroup> = BTreeMap::new();
    for (service, service_results) in results {
        for result in service_results {
            let normalized = result.normalized_label();
            if normalized.is_empty() {
                continue;
            }
            let group = by_label
                .entry(normalized.clone())
                .or_insert_with(|| ConceptGroup {
                    label: result.label.clone(),
                    normalized_label: normalized,
                    matches: Vec::new(),
                    uri_match: true,
                });
            let candidate = ServiceMatch {
                service: service.clone(),
                uri: result.uri.clone(),
                ontology_code: result.ontology_code.clone(),
            };
            if !group.matches.contains(&candidate) {
                group.matches.push(candidate);
            }
        }
    }

    let mut groups: Vec<ConceptGroup> = by_label.into_values().collect();
    for group in &mut groups {
        let first = group.matches.first().map(|m| m.uri.as_str());
        group.uri_match = group.matches.iter().all(|m| Some(m.uri.as_str()) == first);
    }

    let multi_service = counts.len() > 1;
    let mut discrepancies = Vec::new();

    if multi_service {
        let mut distinct: Vec<usize> = counts.values().copied().collect();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() > 1 {
            discrepancies.push(Discrepancy::CountMismatch {
                counts: counts.clone(),
            });
        }
    }

    for group in &groups {
        let services = group.service_count();
        if services > 1 && !group.uri_match {
            discrepancies.push(Discrepancy::UriMismatch {
                label: group.label.clone(),
                uris: group
                    .matches
                    .iter()
                    .map(|m| (m.service.clone(), m.uri.clone()))
                    .collect(),
            });
        } else if services == 1 && multi_service {
            discrepancies.push(Discrepancy::SingleSource {
                label: group.label.clone(),
                service: group.matches[0].service.clone(),
            });
        }
    }

    Comparison {
        concept: concept.to_string(),
        counts,
        groups,
        discrepancies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(label: &str, uri: &str, service: &str) -> ConceptResult {
        ConceptResult::new(label, uri, "MONDO", service)
    }

    #[test]
    fn groups_across_services_by_label() {
        let results = vec![
            (
                "bioportal".to_string(),
                vec![r("Long COVID", "http://x/1", "bioportal"), r("PASC", "http://x/2", "bioportal")],
            ),
            ("ols".to_string(), vec![r("long  covid", "http://x/1", "ols")]),
        ];
        let cmp = compare_results("long covid", &results);

        assert_eq!(cmp.groups.len(), 2);
        let common: Vec<_> = cmp.common().collect();
        assert_eq!(common.len(), 1);
        assert!(common[0].uri_match);
        assert_eq!(cmp.only_in("bioportal").count(), 1);

        assert!(cmp.discrepancies.contains(&Discrepancy::SingleSource {
            label: "PASC".into(),
            service: "bioportal".into(),
        }));
        assert!(matches!(cmp.discrepancies[0], Discrepancy::CountMismatch { .. }));
    }

    #[test]
    fn uri_mismatch_is_flagged() {
        let results = vec![
            ("bioportal".to_string(), vec![r("Fatigue", "http://a/1", "bioportal")]),
            ("ols".to_string(), vec![r("Fatigue", "http://b/1", "ols")]),
        ];
        let cmp = compare_results("fatigue", &results);
        assert!(!cmp.groups[0].uri_match);
        assert_eq!(cmp.discrepancies.len(), 1);
        assert!(matches!(
            &cmp.discrepancies[0],
            Discrepancy::UriMismatch { uris, .. } if uris.len() == 2
        ));
    }

    #[test]
    fn single_service_reports_no_discrepancies() {
        let results = vec![("ols".to_string(), vec![r("Fatigue", "http://b/1", "ols")])];
        let cmp = compare_results("fatigue", &results);
        assert!(cmp.discrepancies.is_empty());
        assert_eq!(cmp.counts["ols"], 1);
    }
}
