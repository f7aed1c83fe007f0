use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{CouncilInfo, OfficeholderRecord, parse_expiry_date};

/// Ward name WAEC uses for mayoral contests. Their term expiry lives in the
/// ward metadata instead of on the candidate row.
pub const MAYORAL_WARD: &str = "MAYORAL";
pub const EXPIRY_OF_TERM_KEY: &str = "Expiry of term";

#[derive(Debug, Clone, Default, Serialize)]
pub struct NormalizedCouncil {
    pub records: Vec<OfficeholderRecord>,
    pub diagnostics: Vec<String>,
}

/// Reduces a council's parsed elections to the officeholders whose terms are
/// still running on `today`. Candidates that cannot be normalized are dropped
/// with a diagnostic; expired terms are dropped silently.
pub fn current_officeholders(today: NaiveDate, council: &CouncilInfo) -> NormalizedCouncil {
    let mut normalized = NormalizedCouncil::default();

    for election in &council.elections {
        for (ward_name, ward) in &election.wards {
            for candidate in &ward.candidates {
                if !candidate.elected {
                    continue;
                }
                if candidate.name.split_whitespace().count() < 2 {
                    normalized.diagnostics.push(format!(
                        "{}: skipping malformed candidate name '{}' in {ward_name}",
                        council.name, candidate.name
                    ));
                    continue;
                }

                let expiry = if ward_name == MAYORAL_WARD {
                    match ward.info.get(EXPIRY_OF_TERM_KEY) {
                        Some(expiry) => expiry.clone(),
                        None => {
                            normalized.diagnostics.push(format!(
                                "{}: mayoral ward in '{}' has no '{EXPIRY_OF_TERM_KEY}' entry",
                                council.name, election.name
                            ));
                            continue;
                        }
                    }
                } else {
                    candidate.expiry.clone()
                };

                let expiry_date = match parse_expiry_date(&expiry) {
                    Ok(date) => date,
                    Err(error) => {
                        normalized.diagnostics.push(format!(
                            "{}: {} in {ward_name}: {error}",
                            council.name, candidate.name
                        ));
                        continue;
                    }
                };
                if expiry_date < today {
                    continue;
                }

                normalized.records.push(OfficeholderRecord {
                    name: candidate.name.clone(),
                    council: council.name.clone(),
                    ward: ward_name.clone(),
                    council_website: council.website().to_string(),
                    expiry,
                });
            }
        }
    }

    normalized
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::model::{CandidateResult, ElectionInfo, WardResult};

    fn candidate(name: &str, expiry: &str, elected: bool) -> CandidateResult {
        CandidateResult {
            name: name.to_string(),
            votes: "100".to_string(),
            expiry: expiry.to_string(),
            elected,
        }
    }

    fn council_with_ward(ward_name: &str, ward: WardResult) -> CouncilInfo {
        let mut wards = BTreeMap::new();
        wards.insert(ward_name.to_string(), ward);
        CouncilInfo {
            name: "Town of Example".to_string(),
            contact: BTreeMap::new(),
            elections: vec![ElectionInfo {
                name: "2023 Ordinary Elections".to_string(),
                date: "21 October 2023".to_string(),
                url: "http://www.elections.wa.gov.au/elections/local/example".to_string(),
                wards,
            }],
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date")
    }

    #[test]
    fn keeps_unexpired_elected_candidates() {
        let ward = WardResult {
            info: BTreeMap::new(),
            candidates: vec![
                candidate("SMITH John", "1 January 2025", true),
                candidate("DOE Jane", "1 January 2025", false),
            ],
        };
        let council = council_with_ward("North Ward", ward);

        let normalized = current_officeholders(today(), &council);
        assert_eq!(normalized.records.len(), 1);
        assert!(normalized.diagnostics.is_empty());

        let record = &normalized.records[0];
        assert_eq!(record.name, "SMITH John");
        assert_eq!(record.council, "Town of Example");
        assert_eq!(record.ward, "North Ward");
        assert_eq!(record.expiry, "1 January 2025");
        assert_eq!(record.council_website, "");
    }

    #[test]
    fn drops_expired_terms_silently() {
        let ward = WardResult {
            info: BTreeMap::new(),
            candidates: vec![candidate("SMITH John", "31 December 2023", true)],
        };
        let council = council_with_ward("North Ward", ward);

        let normalized = current_officeholders(today(), &council);
        assert!(normalized.records.is_empty());
        assert!(normalized.diagnostics.is_empty());
    }

    #[test]
    fn keeps_terms_expiring_today() {
        let ward = WardResult {
            info: BTreeMap::new(),
            candidates: vec![candidate("SMITH John", "1 January 2024", true)],
        };
        let council = council_with_ward("North Ward", ward);

        let normalized = current_officeholders(today(), &council);
        assert_eq!(normalized.records.len(), 1);
    }

    #[test]
    fn mayoral_expiry_comes_from_ward_metadata() {
        let mut info = BTreeMap::new();
        info.insert("Expiry of term".to_string(), "18 October 2025".to_string());
        let ward = WardResult {
            info,
            // The row-level expiry disagrees and would already have lapsed.
            candidates: vec![candidate("NGUYEN Kim", "1 January 2020", true)],
        };
        let council = council_with_ward("MAYORAL", ward);

        let normalized = current_officeholders(today(), &council);
        assert_eq!(normalized.records.len(), 1);
        assert_eq!(normalized.records[0].expiry, "18 October 2025");
    }

    #[test]
    fn mayoral_ward_without_expiry_metadata_is_skipped() {
        let ward = WardResult {
            info: BTreeMap::new(),
            candidates: vec![candidate("NGUYEN Kim", "ignored", true)],
        };
        let council = council_with_ward("MAYORAL", ward);

        let normalized = current_officeholders(today(), &council);
        assert!(normalized.records.is_empty());
        assert_eq!(normalized.diagnostics.len(), 1);
        assert!(normalized.diagnostics[0].contains("Expiry of term"));
    }

    #[test]
    fn malformed_names_and_expiries_are_reported() {
        let ward = WardResult {
            info: BTreeMap::new(),
            candidates: vec![
                candidate("VACANT", "1 January 2025", true),
                candidate("SMITH John", "not a date", true),
            ],
        };
        let council = council_with_ward("North Ward", ward);

        let normalized = current_officeholders(today(), &council);
        assert!(normalized.records.is_empty());
        assert_eq!(normalized.diagnostics.len(), 2);
        assert!(normalized.diagnostics[0].contains("VACANT"));
        assert!(normalized.diagnostics[1].contains("not a date"));
    }

    #[test]
    fn records_carry_the_council_website() {
        let ward = WardResult {
            info: BTreeMap::new(),
            candidates: vec![candidate("SMITH John", "1 January 2025", true)],
        };
        let mut council = council_with_ward("North Ward", ward);
        council.contact.insert(
            "website".to_string(),
            "http://example.wa.gov.au".to_string(),
        );

        let normalized = current_officeholders(today(), &council);
        assert_eq!(
            normalized.records[0].council_website,
            "http://example.wa.gov.au"
        );
    }
}
