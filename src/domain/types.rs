//! Value objects exchanged between the queue, the batch runner and the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of characters kept in an outcome's comment preview.
const PREVIEW_LEN: usize = 50;

/// One remote work order as returned by the queue's pending endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingJob {
    pub id: String,
    pub file_id: String,
    /// Pacing delay between items in seconds. Optional on the wire.
    #[serde(default)]
    pub delay: Option<f64>,
}

impl PendingJob {
    /// Pacing delay, defaulting when the queue omits it.
    pub fn delay_seconds(&self) -> f64 {
        self.delay.unwrap_or(5.0)
    }
}

/// Job lifecycle status reported back to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

/// One unit of work derived from a ledger row.
///
/// `row_id` is the position of the row in the original dataset and is the key
/// used for status write-back; it stays stable even though filtered work sets
/// are sparse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub row_id: usize,
    pub url: String,
    pub comment: String,
}

/// Final status of one processed work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

/// Result of attempting one work item. Append-only for the lifetime of a job.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeRecord {
    /// 1-based position within the filtered work set.
    pub ordinal: usize,
    /// Original row index in the source dataset.
    pub row_id: usize,
    pub url: String,
    pub comment_preview: String,
    pub status: OutcomeStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl OutcomeRecord {
    pub fn success(ordinal: usize, item: &WorkItem, message: impl Into<String>) -> Self {
        Self::new(ordinal, item, OutcomeStatus::Success, message)
    }

    pub fn failed(ordinal: usize, item: &WorkItem, message: impl Into<String>) -> Self {
        Self::new(ordinal, item, OutcomeStatus::Failed, message)
    }

    fn new(
        ordinal: usize,
        item: &WorkItem,
        status: OutcomeStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ordinal,
            row_id: item.row_id,
            url: item.url.clone(),
            comment_preview: preview(&item.comment),
            status,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

fn preview(comment: &str) -> String {
    if comment.chars().count() > PREVIEW_LEN {
        let truncated: String = comment.chars().take(PREVIEW_LEN).collect();
        format!("{truncated}...")
    } else {
        comment.to_string()
    }
}
