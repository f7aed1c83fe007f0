use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::model::{ElectionInfo, ElectionKey, OfficeholderRecord, parse_expiry_date};

const STORE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS page_cache (
    url TEXT PRIMARY KEY,
    body TEXT NOT NULL,
    fetched_at_unix INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS election_cache (
    council TEXT NOT NULL,
    election_name TEXT NOT NULL,
    election_date TEXT NOT NULL,
    payload TEXT NOT NULL,
    parsed_at_unix INTEGER NOT NULL,
    PRIMARY KEY (council, election_name, election_date)
);

CREATE TABLE IF NOT EXISTS officeholders (
    name TEXT NOT NULL,
    council TEXT NOT NULL,
    ward TEXT NOT NULL,
    council_website TEXT NOT NULL,
    expiry TEXT NOT NULL,
    updated_at_unix INTEGER NOT NULL,
    PRIMARY KEY (name, council)
);
CREATE INDEX IF NOT EXISTS idx_officeholders_council ON officeholders(council);
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub db_path: String,
    pub cached_pages: usize,
    pub cached_elections: usize,
    pub officeholders: usize,
}

pub struct Store {
    connection: Connection,
    db_path: PathBuf,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "failed to create database parent directory {}",
                    parent.display()
                )
            })?;
        }
        let connection = open_connection(db_path)?;
        connection
            .execute_batch(STORE_SCHEMA_SQL)
            .context("failed to initialize store schema")?;
        Ok(Self {
            connection,
            db_path: db_path.to_path_buf(),
        })
    }

    /// Returns the cached body for `url`. A blank body marks a download that
    /// never completed; the entry is dropped so the page gets refetched.
    pub fn cached_page(&self, url: &str) -> Result<Option<String>> {
        let mut statement = self
            .connection
            .prepare("SELECT body FROM page_cache WHERE url = ?1 LIMIT 1")
            .context("failed to prepare page cache query")?;
        let mut rows = statement
            .query(params![url])
            .with_context(|| format!("failed to read page cache for {url}"))?;
        let body: String = match rows.next().context("failed to decode page cache row")? {
            Some(row) => row.get(0).context("failed to decode page cache body")?,
            None => return Ok(None),
        };

        if body.trim().is_empty() {
            self.connection
                .execute("DELETE FROM page_cache WHERE url = ?1", params![url])
                .with_context(|| format!("failed to drop blank page cache entry for {url}"))?;
            return Ok(None);
        }
        Ok(Some(body))
    }

    pub fn store_page(&self, url: &str, body: &str) -> Result<()> {
        self.connection
            .execute(
                "INSERT INTO page_cache (url, body, fetched_at_unix) VALUES (?1, ?2, ?3)
                ON CONFLICT(url) DO UPDATE SET
                    body = excluded.body,
                    fetched_at_unix = excluded.fetched_at_unix",
                params![url, body, unix_timestamp()?],
            )
            .with_context(|| format!("failed to cache page {url}"))?;
        Ok(())
    }

    /// Returns cached parsed results for an election. An entry whose payload
    /// no longer decodes is dropped so the election gets reparsed.
    pub fn cached_election(&self, key: &ElectionKey) -> Result<Option<ElectionInfo>> {
        let mut statement = self
            .connection
            .prepare(
                "SELECT payload FROM election_cache
                 WHERE council = ?1 AND election_name = ?2 AND election_date = ?3 LIMIT 1",
            )
            .context("failed to prepare election cache query")?;
        let mut rows = statement
            .query(params![key.council, key.election_name, key.election_date])
            .with_context(|| format!("failed to read election cache for '{}'", key.election_name))?;
        let payload: String = match rows.next().context("failed to decode election cache row")? {
            Some(row) => row
                .get(0)
                .context("failed to decode election cache payload")?,
            None => return Ok(None),
        };

        match serde_json::from_str(&payload) {
            Ok(election) => Ok(Some(election)),
            Err(_) => {
                self.connection
                    .execute(
                        "DELETE FROM election_cache
                         WHERE council = ?1 AND election_name = ?2 AND election_date = ?3",
                        params![key.council, key.election_name, key.election_date],
                    )
                    .context("failed to drop stale election cache entry")?;
                Ok(None)
            }
        }
    }

    pub fn store_election(&self, key: &ElectionKey, election: &ElectionInfo) -> Result<()> {
        let payload = serde_json::to_string(election)
            .with_context(|| format!("failed to encode results for '{}'", key.election_name))?;
        self.connection
            .execute(
                "INSERT INTO election_cache
                    (council, election_name, election_date, payload, parsed_at_unix)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(council, election_name, election_date) DO UPDATE SET
                    payload = excluded.payload,
                    parsed_at_unix = excluded.parsed_at_unix",
                params![
                    key.council,
                    key.election_name,
                    key.election_date,
                    payload,
                    unix_timestamp()?
                ],
            )
            .with_context(|| format!("failed to cache results for '{}'", key.election_name))?;
        Ok(())
    }

    /// Inserts or refreshes an officeholder row. An existing row is only
    /// overwritten when the incoming expiry is strictly later; a stored
    /// expiry that no longer parses is treated as older.
    pub fn upsert_officeholder(&self, record: &OfficeholderRecord) -> Result<UpsertOutcome> {
        let incoming = parse_expiry_date(&record.expiry)
            .with_context(|| format!("cannot store officeholder {}", record.name))?;

        let mut statement = self
            .connection
            .prepare("SELECT expiry FROM officeholders WHERE name = ?1 AND council = ?2 LIMIT 1")
            .context("failed to prepare officeholder lookup")?;
        let mut rows = statement
            .query(params![record.name, record.council])
            .with_context(|| format!("failed to look up officeholder {}", record.name))?;
        let stored: Option<String> = match rows.next().context("failed to decode officeholder row")?
        {
            Some(row) => Some(row.get(0).context("failed to decode stored expiry")?),
            None => None,
        };

        let stored = match stored {
            Some(stored) => stored,
            None => {
                self.connection
                    .execute(
                        "INSERT INTO officeholders
                            (name, council, ward, council_website, expiry, updated_at_unix)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            record.name,
                            record.council,
                            record.ward,
                            record.council_website,
                            record.expiry,
                            unix_timestamp()?
                        ],
                    )
                    .with_context(|| format!("failed to insert officeholder {}", record.name))?;
                return Ok(UpsertOutcome::Inserted);
            }
        };

        let newer = match parse_expiry_date(&stored) {
            Ok(existing) => incoming > existing,
            Err(_) => true,
        };
        if !newer {
            return Ok(UpsertOutcome::Unchanged);
        }

        self.connection
            .execute(
                "UPDATE officeholders
                 SET ward = ?3, council_website = ?4, expiry = ?5, updated_at_unix = ?6
                 WHERE name = ?1 AND council = ?2",
                params![
                    record.name,
                    record.council,
                    record.ward,
                    record.council_website,
                    record.expiry,
                    unix_timestamp()?
                ],
            )
            .with_context(|| format!("failed to update officeholder {}", record.name))?;
        Ok(UpsertOutcome::Updated)
    }

    /// All stored officeholders ordered by council then name, optionally
    /// filtered to one council.
    pub fn officeholders(&self, council: Option<&str>) -> Result<Vec<OfficeholderRecord>> {
        let mut statement = match council {
            Some(_) => self
                .connection
                .prepare(
                    "SELECT name, council, ward, council_website, expiry FROM officeholders
                     WHERE council = ?1 ORDER BY council, name",
                )
                .context("failed to prepare officeholder query")?,
            None => self
                .connection
                .prepare(
                    "SELECT name, council, ward, council_website, expiry FROM officeholders
                     ORDER BY council, name",
                )
                .context("failed to prepare officeholder query")?,
        };
        let rows = match council {
            Some(council) => statement.query_map(params![council], row_to_officeholder),
            None => statement.query_map([], row_to_officeholder),
        }
        .context("failed to run officeholder query")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to decode officeholder row")?);
        }
        Ok(out)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            db_path: self.db_path.display().to_string(),
            cached_pages: self.count_rows("page_cache")?,
            cached_elections: self.count_rows("election_cache")?,
            officeholders: self.count_rows("officeholders")?,
        })
    }

    fn count_rows(&self, table: &str) -> Result<usize> {
        let count: i64 = self
            .connection
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                row.get(0)
            })
            .with_context(|| format!("failed to count rows in {table}"))?;
        usize::try_from(count).context("row count does not fit into usize")
    }
}

fn row_to_officeholder(row: &rusqlite::Row) -> rusqlite::Result<OfficeholderRecord> {
    Ok(OfficeholderRecord {
        name: row.get(0)?,
        council: row.get(1)?,
        ward: row.get(2)?,
        council_website: row.get(3)?,
        expiry: row.get(4)?,
    })
}

fn open_connection(db_path: &Path) -> Result<Connection> {
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open {}", db_path.display()))?;
    connection
        .busy_timeout(Duration::from_secs(5))
        .context("failed to set sqlite busy timeout")?;
    connection
        .pragma_update(None, "foreign_keys", "ON")
        .context("failed to enable foreign_keys pragma")?;
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to enable WAL journal mode")?;
    Ok(connection)
}

fn unix_timestamp() -> Result<i64> {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")?
        .as_secs();
    i64::try_from(seconds).context("timestamp does not fit into i64")
}
