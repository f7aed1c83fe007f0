use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date format used on WAEC results pages, e.g. `18 October 2025`.
pub const EXPIRY_DATE_FORMAT: &str = "%d %B %Y";

/// A council from the directory page, with its contact details and the
/// elections parsed from its council page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CouncilInfo {
    pub name: String,
    pub contact: BTreeMap<String, String>,
    pub elections: Vec<ElectionInfo>,
}

impl CouncilInfo {
    /// Contact website, or an empty string when the page listed none.
    pub fn website(&self) -> &str {
        self.contact.get("website").map(String::as_str).unwrap_or("")
    }
}

/// One election for a council: the link row from the council page plus the
/// per-ward results parsed from the election page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionInfo {
    pub name: String,
    pub date: String,
    pub url: String,
    pub wards: BTreeMap<String, WardResult>,
}

/// Identity of a parsed election in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionKey {
    pub council: String,
    pub election_name: String,
    pub election_date: String,
}

/// Results for a single ward: the metadata key/value pairs and the candidate
/// rows, in document order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WardResult {
    pub info: BTreeMap<String, String>,
    pub candidates: Vec<CandidateResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateResult {
    pub name: String,
    pub votes: String,
    pub expiry: String,
    pub elected: bool,
}

/// A currently sitting officeholder, as persisted in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfficeholderRecord {
    pub name: String,
    pub council: String,
    pub ward: String,
    pub council_website: String,
    pub expiry: String,
}

/// Parses an expiry string such as `21 October 2027` into a date.
pub fn parse_expiry_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, EXPIRY_DATE_FORMAT)
        .with_context(|| format!("failed to parse expiry date '{trimmed}'"))
}
