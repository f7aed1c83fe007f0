use std::collections::BTreeMap;

use anyhow::{Result, anyhow, bail};
use scraper::{ElementRef, Html, Selector};

use crate::model::{CandidateResult, WardResult};

const LEGACY_TABLE_CLASS: &str = "waecModTable";
const INFO_TABLE_CLASS: &str = "election_info";
const RESULTS_TABLE_CLASS: &str = "election_results";
const HEADER_ROW_CLASSES: [&str; 2] = ["waecModTableFooter", "waecModTableHeader"];
const ELECTED_ROW_CLASSES: [&str; 2] = ["Elected_Pos", "backGroundLightBrown"];

/// A council entry from the directory page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouncilLink {
    pub name: String,
    pub href: String,
}

#[derive(Debug, Clone, Default)]
pub struct CouncilListPage {
    pub councils: Vec<CouncilLink>,
    pub diagnostics: Vec<String>,
}

/// An election entry from a council page's election list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionLink {
    pub name: String,
    pub date: String,
    pub href: String,
}

#[derive(Debug, Clone, Default)]
pub struct CouncilPage {
    pub contact: BTreeMap<String, String>,
    pub elections: Vec<ElectionLink>,
}

/// Parses the council directory page. A page with no council entries is a
/// structural error; entries without a link are reported as diagnostics.
pub fn parse_council_list(html: &str) -> Result<CouncilListPage> {
    let document = Html::parse_document(html);
    let council_sel = selector(".council-list-name")?;
    let link_sel = selector("a[href]")?;

    let mut page = CouncilListPage::default();
    for council in document.select(&council_sel) {
        let name = element_text(&council);
        let href = match council.select(&link_sel).next() {
            Some(link) => link.value().attr("href").unwrap_or_default().to_string(),
            None => {
                page.diagnostics
                    .push(format!("council entry '{name}' has no link"));
                continue;
            }
        };
        page.councils.push(CouncilLink { name, href });
    }

    if page.councils.is_empty() {
        bail!("no council entries found on directory page");
    }
    Ok(page)
}

/// Parses a council page: the optional contact block plus the election list.
/// A page without the election list table is a structural error.
pub fn parse_council_page(html: &str) -> Result<CouncilPage> {
    let document = Html::parse_document(html);
    let mut page = CouncilPage::default();

    let contact_sel = selector("div.council-left")?;
    if let Some(block) = document.select(&contact_sel).next() {
        page.contact = parse_contact_block(&block)?;
    }

    let table_sel = selector("table#council-election-list-table")?;
    let table = match document.select(&table_sel).next() {
        Some(table) => table,
        None => bail!("council page has no election list table"),
    };

    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;
    let link_sel = selector("a[href]")?;
    for row in table.select(&row_sel) {
        let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
        if cells.len() != 2 {
            continue;
        }
        let href = match cells[0].select(&link_sel).next() {
            Some(link) => link.value().attr("href").unwrap_or_default().to_string(),
            None => continue,
        };
        page.elections.push(ElectionLink {
            name: element_text(&cells[0]),
            date: element_text(&cells[1]),
            href,
        });
    }

    Ok(page)
}

/// Parses an election results page into per-ward results, keyed by ward name.
/// Handles both the current two-class layout and the legacy marker layout.
pub fn parse_election_results(html: &str) -> Result<BTreeMap<String, WardResult>> {
    let document = Html::parse_document(html);
    let region_sel = selector("#council-results")?;
    let table_sel = selector("table")?;

    let region = match document.select(&region_sel).next() {
        Some(region) => region,
        None => bail!("results page has no #council-results region"),
    };
    let tables: Vec<ElementRef> = region.select(&table_sel).collect();

    // The legacy marker never appears on current-layout pages, so its
    // presence on any table decides the layout for the whole page.
    let legacy = tables
        .iter()
        .any(|table| has_class(table, LEGACY_TABLE_CLASS));
    let pairs = if legacy {
        group_legacy_tables(&tables)?
    } else {
        group_current_tables(&tables)
    };

    let mut wards = BTreeMap::new();
    for pair in pairs {
        let name = if legacy {
            legacy_ward_name(&pair.info)?
        } else {
            current_ward_name(&pair.info)?
        };
        let ward = WardResult {
            info: parse_ward_info(&pair.info)?,
            candidates: parse_ward_candidates(&pair.results)?,
        };
        wards.insert(name, ward);
    }
    Ok(wards)
}

struct WardPair<'a> {
    info: ElementRef<'a>,
    results: ElementRef<'a>,
}

/// Legacy pages mark results tables with `waecModTable` and leave metadata
/// tables unmarked. The first unmarked table describes the election as a
/// whole and is discarded; the rest pair positionally with the marked tables,
/// and a count mismatch is a structural error.
fn group_legacy_tables<'a>(tables: &[ElementRef<'a>]) -> Result<Vec<WardPair<'a>>> {
    let mut info_tables = Vec::new();
    let mut results_tables = Vec::new();
    for table in tables {
        if has_class(table, LEGACY_TABLE_CLASS) {
            results_tables.push(*table);
        } else {
            info_tables.push(*table);
        }
    }

    if info_tables.is_empty() {
        bail!("legacy results page has no metadata tables");
    }
    let ward_infos = &info_tables[1..];
    if ward_infos.len() != results_tables.len() {
        bail!(
            "legacy results page pairs {} metadata tables with {} results tables",
            ward_infos.len(),
            results_tables.len()
        );
    }

    Ok(ward_infos
        .iter()
        .zip(results_tables)
        .map(|(info, results)| WardPair {
            info: *info,
            results,
        })
        .collect())
}

/// Current pages interleave `election_info` and `election_results` tables,
/// matched on the first class token. An info table opens a group and a
/// results table closes it; the ward pairs the group's first table with its
/// last. Tables with other classes are ignored, and a trailing group that
/// never closed is dropped.
fn group_current_tables<'a>(tables: &[ElementRef<'a>]) -> Vec<WardPair<'a>> {
    let mut pairs = Vec::new();
    let mut open: Vec<ElementRef<'a>> = Vec::new();
    for table in tables {
        match first_class(table) {
            Some(INFO_TABLE_CLASS) => open.push(*table),
            Some(RESULTS_TABLE_CLASS) => {
                open.push(*table);
                if let Some(info) = open.first() {
                    pairs.push(WardPair {
                        info: *info,
                        results: *table,
                    });
                }
                open.clear();
            }
            _ => {}
        }
    }
    pairs
}

/// Legacy ward name: the first row's cell texts joined, everything after the
/// last ` - ` separator.
fn legacy_ward_name(info: &ElementRef) -> Result<String> {
    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;
    let row = match info.select(&row_sel).next() {
        Some(row) => row,
        None => bail!("legacy metadata table has no rows"),
    };
    let joined = row
        .select(&cell_sel)
        .map(|cell| cell.text().collect::<String>())
        .collect::<Vec<_>>()
        .join(" ");
    let name = joined.rsplit(" - ").next().unwrap_or(&joined);
    Ok(name.trim().to_string())
}

/// Current ward name: the metadata table's first header cell, falling back
/// to its first data cell.
fn current_ward_name(info: &ElementRef) -> Result<String> {
    let header_sel = selector("th")?;
    let cell_sel = selector("td")?;
    let cell = info
        .select(&header_sel)
        .next()
        .or_else(|| info.select(&cell_sel).next());
    match cell {
        Some(cell) => Ok(element_text(&cell)),
        None => bail!("ward metadata table has no header cell"),
    }
}

/// Rows with exactly two cells become key/value metadata entries; any other
/// row shape is skipped.
fn parse_ward_info(info: &ElementRef) -> Result<BTreeMap<String, String>> {
    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;
    let mut details = BTreeMap::new();
    for row in info.select(&row_sel) {
        let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
        if cells.len() != 2 {
            continue;
        }
        details.insert(element_text(&cells[0]), element_text(&cells[1]));
    }
    Ok(details)
}

/// Rows with exactly four cells are candidate rows: name, votes, share
/// (discarded), term expiry. The first class token distinguishes header and
/// footer furniture from elected-candidate highlighting; an unrecognized
/// token is a structural error.
fn parse_ward_candidates(results: &ElementRef) -> Result<Vec<CandidateResult>> {
    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;
    let mut candidates = Vec::new();
    for row in results.select(&row_sel) {
        let cells: Vec<ElementRef> = row.select(&cell_sel).collect();
        if cells.len() != 4 {
            continue;
        }
        let elected = match first_class(&row) {
            None => false,
            Some(class) if HEADER_ROW_CLASSES.contains(&class) => continue,
            Some(class) if ELECTED_ROW_CLASSES.contains(&class) => true,
            Some(class) => bail!("unrecognized results row class '{class}'"),
        };
        candidates.push(CandidateResult {
            name: element_text(&cells[0]),
            votes: element_text(&cells[1]),
            expiry: element_text(&cells[3]),
            elected,
        });
    }
    Ok(candidates)
}

fn parse_contact_block(block: &ElementRef) -> Result<BTreeMap<String, String>> {
    let entry_sel = selector("div")?;
    let strong_sel = selector("strong")?;
    let link_sel = selector("a[href]")?;

    let mut contact = BTreeMap::new();
    for entry in block.select(&entry_sel) {
        if let Some(label) = entry.select(&strong_sel).next() {
            let label_text = label.text().collect::<String>();
            let full_text = entry.text().collect::<String>();
            let value = full_text
                .get(label_text.len()..)
                .unwrap_or("")
                .trim()
                .to_string();
            contact.insert(label_text.trim().to_lowercase(), value);
        } else if let Some(link) = entry.select(&link_sel).next() {
            let href = link
                .value()
                .attr("href")
                .unwrap_or_default()
                .trim()
                .to_string();
            if href.starts_with("mailto:") {
                contact.insert("email".to_string(), href);
            } else {
                contact.insert("website".to_string(), href);
            }
        } else if !contact.contains_key("other") {
            contact.insert("other".to_string(), element_text(&entry));
        }
    }
    Ok(contact)
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|error| anyhow!("invalid selector '{css}': {error}"))
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// First token of the raw class attribute. `Element::classes` yields a
/// sorted view, so the attribute is read directly to keep document order.
fn first_class<'a>(element: &ElementRef<'a>) -> Option<&'a str> {
    element
        .value()
        .attr("class")
        .and_then(|value| value.split_whitespace().next())
}

fn has_class(element: &ElementRef, class: &str) -> bool {
    element
        .value()
        .attr("class")
        .map(|value| value.split_whitespace().any(|token| token == class))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const COUNCIL_LIST_HTML: &str = r#"
<html><body>
<div class="council-list-name"><a href="/elections/local/council-list/albany">City of Albany</a></div>
<div class="council-list-name"><a href="/elections/local/council-list/bunbury">City of Bunbury</a></div>
<div class="council-list-name">Orphaned entry</div>
</body></html>
"#;

    const COUNCIL_PAGE_HTML: &str = r#"
<html><body>
<div class="council-left">
  <div><strong>Phone:</strong> (08) 9071 0666</div>
  <div><a href="mailto:records@albany.wa.gov.au">Email us</a></div>
  <div><a href="http://www.albany.wa.gov.au">www.albany.wa.gov.au</a></div>
  <div>PO Box 484, Albany WA 6331</div>
  <div>Second plain entry is dropped</div>
</div>
<table id="council-election-list-table">
  <tr><th>Election</th><th>Date</th></tr>
  <tr><td><a href="council-list/2023-ordinary-elections-albany">2023 Ordinary Elections</a></td><td>21 October 2023</td></tr>
  <tr><td colspan="2">spacer</td></tr>
  <tr><td>No link in this row</td><td>1 January 2020</td></tr>
</table>
</body></html>
"#;

    const CURRENT_RESULTS_HTML: &str = r#"
<html><body>
<div id="council-results">
  <table class="election_info">
    <tr><th>MAYORAL</th></tr>
    <tr><td>Expiry of term</td><td>18 October 2025</td></tr>
    <tr><td>Vacancies</td><td>1</td></tr>
  </table>
  <table class="election_results">
    <tr class="waecModTableHeader"><td>Candidate</td><td>Votes</td><td>%</td><td>Expiry</td></tr>
    <tr class="Elected_Pos"><td>SMITH John</td><td>1,234</td><td>55.1</td><td></td></tr>
    <tr><td>DOE Jane</td><td>1,005</td><td>44.9</td><td></td></tr>
  </table>
  <table class="election_info">
    <tr><th>North Ward</th></tr>
    <tr><td>Expiry of term</td><td>18 October 2025</td></tr>
  </table>
  <table class="election_results extraDecoration">
    <tr class="backGroundLightBrown"><td>NGUYEN Kim</td><td>800</td><td>60.0</td><td>18 October 2025</td></tr>
    <tr class="waecModTableFooter"><td>Total</td><td>1,333</td><td></td><td></td></tr>
  </table>
</div>
</body></html>
"#;

    const LEGACY_RESULTS_HTML: &str = r#"
<html><body>
<div id="council-results">
  <table><tr><td>2005 Ordinary Elections</td></tr></table>
  <table>
    <tr><td>Town of Example - COASTAL WARD</td></tr>
    <tr><td>Expiry of term</td><td>15 October 2011</td></tr>
  </table>
  <table class="waecModTable">
    <tr class="waecModTableHeader"><td>Candidate</td><td>Votes</td><td>%</td><td>Expiry</td></tr>
    <tr class="Elected_Pos"><td>BLOGGS Fred</td><td>432</td><td>51.2</td><td>15 October 2011</td></tr>
    <tr><td>CITIZEN Joan</td><td>411</td><td>48.8</td><td></td></tr>
    <tr class="waecModTableFooter"><td>Total</td><td>843</td><td></td><td></td></tr>
  </table>
</div>
</body></html>
"#;

    #[test]
    fn parses_council_list_and_reports_orphans() {
        let page = parse_council_list(COUNCIL_LIST_HTML).expect("parse council list");
        assert_eq!(
            page.councils,
            vec![
                CouncilLink {
                    name: "City of Albany".to_string(),
                    href: "/elections/local/council-list/albany".to_string(),
                },
                CouncilLink {
                    name: "City of Bunbury".to_string(),
                    href: "/elections/local/council-list/bunbury".to_string(),
                },
            ]
        );
        assert_eq!(page.diagnostics.len(), 1);
        assert!(page.diagnostics[0].contains("Orphaned entry"));
    }

    #[test]
    fn council_list_without_entries_is_an_error() {
        let error = parse_council_list("<html><body></body></html>").expect_err("must fail");
        assert!(error.to_string().contains("no council entries"));
    }

    #[test]
    fn parses_council_page_contact_block() {
        let page = parse_council_page(COUNCIL_PAGE_HTML).expect("parse council page");
        assert_eq!(page.contact.get("phone:").map(String::as_str), Some("(08) 9071 0666"));
        assert_eq!(
            page.contact.get("email").map(String::as_str),
            Some("mailto:records@albany.wa.gov.au")
        );
        assert_eq!(
            page.contact.get("website").map(String::as_str),
            Some("http://www.albany.wa.gov.au")
        );
        assert_eq!(
            page.contact.get("other").map(String::as_str),
            Some("PO Box 484, Albany WA 6331")
        );
    }

    #[test]
    fn parses_council_page_election_list() {
        let page = parse_council_page(COUNCIL_PAGE_HTML).expect("parse council page");
        assert_eq!(
            page.elections,
            vec![ElectionLink {
                name: "2023 Ordinary Elections".to_string(),
                date: "21 October 2023".to_string(),
                href: "council-list/2023-ordinary-elections-albany".to_string(),
            }]
        );
    }

    #[test]
    fn council_page_without_election_table_is_an_error() {
        let html = "<html><body><div class=\"council-left\"></div></body></html>";
        let error = parse_council_page(html).expect_err("must fail");
        assert!(error.to_string().contains("no election list table"));
    }

    #[test]
    fn council_page_without_contact_block_has_empty_contact() {
        let html = r#"
<table id="council-election-list-table">
  <tr><td><a href="council-list/x">2021 Elections</a></td><td>16 October 2021</td></tr>
</table>
"#;
        let page = parse_council_page(html).expect("parse council page");
        assert!(page.contact.is_empty());
        assert_eq!(page.elections.len(), 1);
    }

    #[test]
    fn parses_current_layout_results() {
        let wards = parse_election_results(CURRENT_RESULTS_HTML).expect("parse results");
        assert_eq!(wards.len(), 2);

        let mayoral = wards.get("MAYORAL").expect("mayoral ward");
        assert_eq!(
            mayoral.info.get("Expiry of term").map(String::as_str),
            Some("18 October 2025")
        );
        assert_eq!(mayoral.candidates.len(), 2);
        assert_eq!(mayoral.candidates[0].name, "SMITH John");
        assert_eq!(mayoral.candidates[0].votes, "1,234");
        assert!(mayoral.candidates[0].elected);
        assert!(!mayoral.candidates[1].elected);

        let north = wards.get("North Ward").expect("north ward");
        assert_eq!(north.candidates.len(), 1);
        assert!(north.candidates[0].elected);
        assert_eq!(north.candidates[0].expiry, "18 October 2025");
    }

    #[test]
    fn parses_legacy_layout_results() {
        let wards = parse_election_results(LEGACY_RESULTS_HTML).expect("parse results");
        assert_eq!(wards.len(), 1);

        let coastal = wards.get("COASTAL WARD").expect("coastal ward");
        assert_eq!(
            coastal.info.get("Expiry of term").map(String::as_str),
            Some("15 October 2011")
        );
        assert_eq!(coastal.candidates.len(), 2);
        assert_eq!(coastal.candidates[0].name, "BLOGGS Fred");
        assert!(coastal.candidates[0].elected);
        assert_eq!(coastal.candidates[0].expiry, "15 October 2011");
        assert_eq!(coastal.candidates[1].name, "CITIZEN Joan");
        assert!(!coastal.candidates[1].elected);
    }

    #[test]
    fn legacy_layout_with_mismatched_tables_is_an_error() {
        let html = r#"
<div id="council-results">
  <table><tr><td>2005 Ordinary Elections</td></tr></table>
  <table class="waecModTable">
    <tr><td>A</td><td>1</td><td>50.0</td><td></td></tr>
  </table>
  <table class="waecModTable">
    <tr><td>B</td><td>1</td><td>50.0</td><td></td></tr>
  </table>
</div>
"#;
        let error = parse_election_results(html).expect_err("must fail");
        assert!(error.to_string().contains("pairs 0 metadata tables"));
    }

    #[test]
    fn results_page_without_region_is_an_error() {
        let error =
            parse_election_results("<html><body><p>gone</p></body></html>").expect_err("must fail");
        assert!(error.to_string().contains("#council-results"));
    }

    #[test]
    fn unrecognized_candidate_row_class_is_an_error() {
        let html = r#"
<div id="council-results">
  <table class="election_info"><tr><th>MAYORAL</th></tr></table>
  <table class="election_results">
    <tr class="strangeRowClass"><td>A</td><td>1</td><td>100.0</td><td></td></tr>
  </table>
</div>
"#;
        let error = parse_election_results(html).expect_err("must fail");
        assert!(error.to_string().contains("strangeRowClass"));
    }

    #[test]
    fn unclosed_info_group_is_dropped() {
        let html = r#"
<div id="council-results">
  <table class="election_info">
    <tr><th>MAYORAL</th></tr>
  </table>
  <table class="election_results">
    <tr class="Elected_Pos"><td>SMITH John</td><td>10</td><td>100.0</td><td>1 January 2030</td></tr>
  </table>
  <table class="election_info">
    <tr><th>Dangling Ward</th></tr>
  </table>
</div>
"#;
        let wards = parse_election_results(html).expect("parse results");
        assert_eq!(wards.len(), 1);
        assert!(wards.contains_key("MAYORAL"));
    }
}
