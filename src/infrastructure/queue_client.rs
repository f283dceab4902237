//! HTTP client for the hosted job queue
//!
//! Four endpoints: pending-job poll, file download, status/result upload and
//! fire-and-forget log streaming. Log posts use a short timeout and swallow
//! failures; status uploads use a long timeout and surface failures to the
//! caller, who logs a warning but does not retry.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::domain::{JobStatus, PendingJob, WorkerError};

/// Queue client configuration.
#[derive(Debug, Clone)]
pub struct QueueClientConfig {
    /// Dashboard base URL; the job API lives under `/api/job`.
    pub base_url: String,
    /// Timeout for pending-job polls.
    pub poll_timeout: Duration,
    /// Timeout for log streaming. Short: logs are best-effort.
    pub log_timeout: Duration,
    /// Timeout for status/result uploads. Long: carries the result file.
    pub upload_timeout: Duration,
}

impl QueueClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            poll_timeout: Duration::from_secs(10),
            log_timeout: Duration::from_secs(2),
            upload_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PendingResponse {
    job: Option<PendingJob>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResponse {
    base64_data: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusUpdate<'a> {
    status: JobStatus,
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_file_base64: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogEntry<'a> {
    job_id: &'a str,
    message: &'a str,
    level: &'a str,
    timestamp: String,
}

/// Client for the remote job queue.
#[derive(Debug, Clone)]
pub struct QueueClient {
    http: Client,
    config: QueueClientConfig,
}

impl QueueClient {
    pub fn new(config: QueueClientConfig) -> Result<Self, WorkerError> {
        let http = Client::builder().build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/job/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Poll for the next pending job. `Ok(None)` means the queue is empty.
    pub async fn pending_job(&self) -> Result<Option<PendingJob>, WorkerError> {
        let response = self
            .http
            .get(self.endpoint("pending"))
            .timeout(self.config.poll_timeout)
            .send()
            .await?
            .error_for_status()?;
        let body: PendingResponse = response.json().await?;
        Ok(body.job)
    }

    /// Download the job's source file. The payload arrives base64-encoded.
    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>, WorkerError> {
        info!("Downloading file {file_id}");
        let response = self
            .http
            .get(self.endpoint(&format!("file/{file_id}")))
            .send()
            .await?
            .error_for_status()?;
        let body: FileResponse = response.json().await?;
        let encoded = body
            .base64_data
            .ok_or_else(|| WorkerError::download("server returned no file data"))?;
        BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| WorkerError::download(format!("invalid base64 payload: {e}")))
    }

    /// Report a job status, optionally attaching the updated result file.
    pub async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        summary: &str,
        updated_file: Option<&[u8]>,
    ) -> Result<(), WorkerError> {
        info!("Updating job {job_id} status to {status:?}");
        let body = StatusUpdate {
            status,
            summary,
            updated_file_base64: updated_file.map(|bytes| BASE64.encode(bytes)),
        };
        self.http
            .post(self.endpoint(&format!("status/{job_id}")))
            .timeout(self.config.upload_timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Stream one log line to the dashboard. Best-effort: failures are
    /// logged locally and swallowed so they can never stall a job.
    pub async fn stream_log(&self, job_id: &str, message: &str, level: &str) {
        let body = LogEntry {
            job_id,
            message,
            level,
            timestamp: Utc::now().to_rfc3339(),
        };
        let result = self
            .http
            .post(self.endpoint("log"))
            .timeout(self.config.log_timeout)
            .json(&body)
            .send()
            .await;
        if let Err(e) = result {
            debug!("Log stream to queue failed: {e}");
        }
    }
}

/// Severity tags understood by the dashboard's log view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Progress,
    Summary,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Progress => "progress",
            Self::Summary => "summary",
        }
    }
}

/// Job-scoped logger that writes to local tracing and mirrors every line to
/// the queue in a detached task, so a slow dashboard never paces the batch.
#[derive(Debug, Clone)]
pub struct JobReporter {
    client: Option<QueueClient>,
    job_id: String,
}

impl JobReporter {
    pub fn new(client: QueueClient, job_id: impl Into<String>) -> Self {
        Self {
            client: Some(client),
            job_id: job_id.into(),
        }
    }

    /// Reporter that only logs locally. Used when there is no queue to talk
    /// to (and by tests).
    pub fn disconnected(job_id: impl Into<String>) -> Self {
        Self {
            client: None,
            job_id: job_id.into(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Warning => warn!("[job {}] {message}", self.job_id),
            LogLevel::Error => error!("[job {}] {message}", self.job_id),
            _ => info!("[job {}] {message}", self.job_id),
        }

        if let Some(client) = &self.client {
            let client = client.clone();
            let job_id = self.job_id.clone();
            tokio::spawn(async move {
                client.stream_log(&job_id, &message, level.as_str()).await;
            });
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> QueueClient {
        QueueClient::new(QueueClientConfig::new(server.uri())).expect("client")
    }

    #[tokio::test]
    async fn pending_job_decodes_null_as_empty_queue() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/job/pending"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job": null })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let job = client.pending_job().await.expect("poll");
        assert!(job.is_none());
    }

    #[tokio::test]
    async fn pending_job_decodes_camel_case_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/job/pending"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "job": { "id": "job-7", "fileId": "file-9", "delay": 1.5 }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let job = client.pending_job().await.expect("poll").expect("job");
        assert_eq!(job.id, "job-7");
        assert_eq!(job.file_id, "file-9");
        assert!((job.delay_seconds() - 1.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn download_decodes_base64_payload() {
        let server = MockServer::start().await;
        let payload = BASE64.encode(b"url,comment\n");
        Mock::given(method("GET"))
            .and(path("/api/job/file/file-9"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "base64Data": payload })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let bytes = client.download_file("file-9").await.expect("download");
        assert_eq!(bytes, b"url,comment\n");
    }

    #[tokio::test]
    async fn download_without_data_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/job/file/file-9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "base64Data": null })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.download_file("file-9").await.expect_err("no data");
        assert!(matches!(err, WorkerError::Download { .. }));
    }

    #[tokio::test]
    async fn status_upload_posts_screaming_status_and_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/job/status/job-7"))
            .and(body_partial_json(json!({
                "status": "COMPLETED",
                "summary": "done",
                "updatedFileBase64": BASE64.encode(b"bytes")
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client
            .update_status("job-7", JobStatus::Completed, "done", Some(b"bytes"))
            .await
            .expect("upload");
    }

    #[tokio::test]
    async fn stream_log_swallows_transport_failures() {
        // No server listening at all.
        let client = QueueClient::new(QueueClientConfig::new("http://127.0.0.1:1"))
            .expect("client");
        client.stream_log("job-7", "hello", "info").await;
    }
}
