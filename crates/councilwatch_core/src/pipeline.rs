use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{debug, info, warn};
use serde::Serialize;

use crate::config::WatchConfig;
use crate::fetch::DocumentFetcher;
use crate::model::{CouncilInfo, ElectionInfo, ElectionKey};
use crate::normalize::current_officeholders;
use crate::parse::{parse_council_list, parse_council_page, parse_election_results};
use crate::store::{Store, UpsertOutcome};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub full: bool,
    pub today: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub success: bool,
    pub councils: usize,
    pub councils_skipped: usize,
    pub elections: usize,
    pub elections_parsed: usize,
    pub elections_cached: usize,
    pub elections_skipped: usize,
    pub pages_fetched: usize,
    pub pages_cached: usize,
    pub wards: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub candidates_skipped: usize,
    pub request_count: usize,
    pub errors: Vec<String>,
}

/// Joins the directory host with a council link href.
pub fn council_url(host: &str, href: &str) -> String {
    let host = host.trim_end_matches('/');
    if href.starts_with('/') {
        format!("{host}{href}")
    } else {
        format!("{host}/{href}")
    }
}

/// Derives an election results URL. Election hrefs are written relative to
/// the council-list section, so the council URL loses its last two path
/// segments and the href its own leading segment.
pub fn election_url(council_url: &str, href: &str) -> String {
    let mut base = council_url;
    for _ in 0..2 {
        if let Some(index) = base.rfind('/') {
            base = &base[..index];
        }
    }
    let tail = match href.split_once('/') {
        Some((_, rest)) => rest,
        None => href,
    };
    format!("{base}/{tail}")
}

/// Executes one batch pass: walk the council directory, parse every council's
/// election history, and fold current officeholders into the store. Fetch
/// failures are fatal; parse failures are scoped to their council or election
/// and reported in the returned summary.
pub fn run(
    store: &Store,
    fetcher: &mut dyn DocumentFetcher,
    config: &WatchConfig,
    options: &RunOptions,
) -> Result<RunReport> {
    let mut report = RunReport {
        success: false,
        councils: 0,
        councils_skipped: 0,
        elections: 0,
        elections_parsed: 0,
        elections_cached: 0,
        elections_skipped: 0,
        pages_fetched: 0,
        pages_cached: 0,
        wards: 0,
        inserted: 0,
        updated: 0,
        unchanged: 0,
        candidates_skipped: 0,
        request_count: 0,
        errors: Vec::new(),
    };

    let host = config.host();
    let list_url = config.council_list_url();
    let list_html = fetch_page(store, fetcher, &mut report, options.full, &list_url)
        .with_context(|| format!("failed to load council directory {list_url}"))?;
    let directory = parse_council_list(&list_html)
        .with_context(|| format!("failed to parse council directory {list_url}"))?;
    for diagnostic in directory.diagnostics {
        warn!("{diagnostic}");
        report.errors.push(diagnostic);
    }

    info!("processing {} councils", directory.councils.len());
    for link in &directory.councils {
        report.councils += 1;
        let page_url = council_url(&host, &link.href);
        let council_html = fetch_page(store, fetcher, &mut report, options.full, &page_url)
            .with_context(|| format!("failed to load council page for {}", link.name))?;
        let page = match parse_council_page(&council_html) {
            Ok(page) => page,
            Err(error) => {
                warn!("skipping {}: {error}", link.name);
                report.councils_skipped += 1;
                report.errors.push(format!("{}: {error}", link.name));
                continue;
            }
        };

        let mut council = CouncilInfo {
            name: link.name.clone(),
            contact: page.contact,
            elections: Vec::new(),
        };

        for election_link in &page.elections {
            report.elections += 1;
            let key = ElectionKey {
                council: council.name.clone(),
                election_name: election_link.name.clone(),
                election_date: election_link.date.clone(),
            };

            if !options.full
                && let Some(cached) = store.cached_election(&key)?
            {
                debug!("using cached results for '{}'", key.election_name);
                report.elections_cached += 1;
                report.wards += cached.wards.len();
                council.elections.push(cached);
                continue;
            }

            let url = election_url(&page_url, &election_link.href);
            let results_html = fetch_page(store, fetcher, &mut report, options.full, &url)
                .with_context(|| format!("failed to load results for '{}'", election_link.name))?;
            let wards = match parse_election_results(&results_html) {
                Ok(wards) => wards,
                Err(error) => {
                    warn!(
                        "skipping '{}' for {}: {error}",
                        election_link.name, council.name
                    );
                    report.elections_skipped += 1;
                    report
                        .errors
                        .push(format!("{}: {}: {error}", council.name, election_link.name));
                    continue;
                }
            };

            let election = ElectionInfo {
                name: election_link.name.clone(),
                date: election_link.date.clone(),
                url,
                wards,
            };
            store.store_election(&key, &election)?;
            report.elections_parsed += 1;
            report.wards += election.wards.len();
            council.elections.push(election);
        }

        let normalized = current_officeholders(options.today, &council);
        report.candidates_skipped += normalized.diagnostics.len();
        for diagnostic in normalized.diagnostics {
            warn!("{diagnostic}");
            report.errors.push(diagnostic);
        }
        for record in &normalized.records {
            match store.upsert_officeholder(record)? {
                UpsertOutcome::Inserted => report.inserted += 1,
                UpsertOutcome::Updated => report.updated += 1,
                UpsertOutcome::Unchanged => report.unchanged += 1,
            }
        }
        info!(
            "{}: {} elections, {} current officeholders",
            council.name,
            council.elections.len(),
            normalized.records.len()
        );
    }

    report.request_count = fetcher.request_count();
    report.success = report.errors.is_empty();
    Ok(report)
}

fn fetch_page(
    store: &Store,
    fetcher: &mut dyn DocumentFetcher,
    report: &mut RunReport,
    full: bool,
    url: &str,
) -> Result<String> {
    if !full
        && let Some(body) = store.cached_page(url)?
    {
        debug!("cache hit for {url}");
        report.pages_cached += 1;
        return Ok(body);
    }
    let body = fetcher.fetch(url)?;
    store.store_page(url, &body)?;
    report.pages_fetched += 1;
    Ok(body)
}
