//! Row ledger - the authoritative copy of one job's tabular work order
//!
//! Loads the downloaded bytes, resolves the two required logical columns
//! (target URL and comment text) by normalized-name heuristics, detects or
//! creates the status column, and filters the rows down to the actual work
//! set. The full original table is retained so that the status write-back
//! touches nothing but the status cell of processed rows.
//!
//! The canonical interchange format is CSV; the ledger is serialized back to
//! CSV exactly once, at job end.

use tracing::{info, warn};

use crate::domain::{OutcomeStatus, WorkItem, WorkerError};

/// Marker written for a successfully processed row.
pub const SUCCESS_MARKER: &str = "Y";
/// Marker written for a row whose retries were exhausted.
pub const FAILURE_MARKER: &str = "N";

/// Status column name used when the source data has none.
const DEFAULT_STATUS_COLUMN: &str = "Commented (Y/N)";

/// Cell values meaning "already done", compared case-insensitively.
const COMPLETED_MARKERS: [&str; 4] = ["Y", "YES", "TRUE", "1"];

const URL_ALIASES: [&str; 5] = ["url", "posturl", "tweet_url", "link", "post_link"];
const COMMENT_ALIASES: [&str; 5] = [
    "generated_comment",
    "comment",
    "reply",
    "comment_text",
    "generatedcomment",
];
const STATUS_ALIASES: [&str; 5] = ["commented_(y/n)", "commented", "done", "posted", "status"];

#[derive(Debug, Clone, Copy)]
enum ColumnRole {
    Url,
    Comment,
}

/// Filtered set of rows still requiring work, in original dataset order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkSet {
    pub items: Vec<WorkItem>,
}

impl WorkSet {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Full original table plus the designated status column.
///
/// Exclusively owned by the batch runner for the duration of one job;
/// single-writer by construction.
#[derive(Debug, Clone)]
pub struct RowLedger {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    status_col: usize,
}

impl RowLedger {
    /// Decode the work order and derive the work set.
    ///
    /// Rows with a blank URL or comment, and rows whose status cell already
    /// holds a completion marker, are excluded from the work set but kept in
    /// the ledger untouched.
    pub fn load(bytes: &[u8]) -> Result<(Self, WorkSet), WorkerError> {
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| WorkerError::decode(e.to_string()))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.is_empty() {
            return Err(WorkerError::decode("work order has no header row"));
        }

        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| WorkerError::decode(e.to_string()))?;
            let mut row: Vec<String> = record.iter().map(ToString::to_string).collect();
            if row.len() < headers.len() {
                row.resize(headers.len(), String::new());
            }
            rows.push(row);
        }

        let url_col = detect_column(&headers, ColumnRole::Url);
        let comment_col = detect_column(&headers, ColumnRole::Comment);
        if url_col.is_none() || comment_col.is_none() {
            let mut missing = Vec::new();
            if url_col.is_none() {
                missing.push("URL-like column (e.g. postUrl/url/link)");
            }
            if comment_col.is_none() {
                missing.push("comment-like column (e.g. Generated comment/comment/reply)");
            }
            return Err(WorkerError::schema(missing.join(", ")));
        }
        let (url_col, comment_col) = (
            url_col.unwrap_or_default(),
            comment_col.unwrap_or_default(),
        );
        info!(
            "Detected URL column '{}' and comment column '{}'",
            headers[url_col], headers[comment_col]
        );

        let mut headers = headers;
        let status_col = match headers
            .iter()
            .position(|h| STATUS_ALIASES.contains(&normalize(h).as_str()))
        {
            Some(idx) => idx,
            None => {
                headers.push(DEFAULT_STATUS_COLUMN.to_string());
                for row in &mut rows {
                    row.push(String::new());
                }
                info!("Created '{DEFAULT_STATUS_COLUMN}' column (was missing)");
                headers.len() - 1
            }
        };

        let mut items = Vec::new();
        let mut already_done = 0usize;
        for (row_id, row) in rows.iter().enumerate() {
            let url = row.get(url_col).map(|v| v.trim()).unwrap_or_default();
            let comment = row
                .get(comment_col)
                .map(|v| normalize_comment(v))
                .unwrap_or_default();
            if url.is_empty() || comment.is_empty() {
                continue;
            }
            if row.get(status_col).is_some_and(|v| is_completed(v)) {
                already_done += 1;
                continue;
            }
            items.push(WorkItem {
                row_id,
                url: url.to_string(),
                comment,
            });
        }
        info!(
            "Work order loaded: {} rows total, {} already done, {} to process",
            rows.len(),
            already_done,
            items.len()
        );

        let ledger = Self {
            headers,
            rows,
            status_col,
        };
        Ok((ledger, WorkSet { items }))
    }

    /// Record a processed row's final status in the retained full copy.
    ///
    /// Never fails: an unknown row id is logged and ignored, since this runs
    /// inside the per-row loop which must continue regardless.
    pub fn mark_row(&mut self, row_id: usize, status: OutcomeStatus) {
        let marker = match status {
            OutcomeStatus::Success => SUCCESS_MARKER,
            OutcomeStatus::Failed => FAILURE_MARKER,
        };
        match self.rows.get_mut(row_id) {
            Some(row) => {
                if row.len() <= self.status_col {
                    row.resize(self.status_col + 1, String::new());
                }
                row[self.status_col] = marker.to_string();
            }
            None => warn!("Row {row_id} not found in ledger; '{marker}' not recorded"),
        }
    }

    /// Encode the full table back to CSV, all original columns plus status.
    pub fn to_bytes(&self) -> Result<Vec<u8>, WorkerError> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer
            .into_inner()
            .map_err(|e| WorkerError::Encode(e.into_error().into()))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn status_column(&self) -> &str {
        &self.headers[self.status_col]
    }

    /// Status cell of one row, if present.
    pub fn status_of(&self, row_id: usize) -> Option<&str> {
        self.rows
            .get(row_id)
            .and_then(|row| row.get(self.status_col))
            .map(String::as_str)
    }
}

fn detect_column(headers: &[String], role: ColumnRole) -> Option<usize> {
    headers.iter().position(|raw| {
        let norm = normalize(raw);
        match role {
            ColumnRole::Url => {
                URL_ALIASES.contains(&norm.as_str())
                    || (norm.contains("url") && (norm.contains("post") || norm.contains("tweet")))
            }
            ColumnRole::Comment => {
                COMMENT_ALIASES.contains(&norm.as_str())
                    || norm.contains("comment")
                    || norm.contains("reply")
            }
        }
    })
}

/// Case, space and punctuation-insensitive header comparison key.
fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase().replace([' ', '-'], "_")
}

fn normalize_comment(raw: &str) -> String {
    raw.replace(['\n', '\r'], " ").trim().to_string()
}

fn is_completed(value: &str) -> bool {
    let value = value.trim().to_uppercase();
    COMPLETED_MARKERS.contains(&value.as_str())
}
