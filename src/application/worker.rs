//! Worker loop - polls the queue and drives whole jobs
//!
//! The outer reconciliation loop: poll for a pending job, download its work
//! order, run the batch inside a fresh browser session, and report the final
//! status with the updated ledger attached. A job failure never takes the
//! loop down; the loop only exits after a run of consecutive empty polls.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::fs;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::application::batch::{BatchRunner, summary_report};
use crate::application::processor::{ItemProcessor, ProcessorTiming};
use crate::application::session::{SessionController, SessionMode, SessionState, SessionTiming};
use crate::domain::{JobStatus, PendingJob, WorkerError};
use crate::infrastructure::config::WorkerConfig;
use crate::infrastructure::driver::DriverFactory;
use crate::infrastructure::ledger::RowLedger;
use crate::infrastructure::queue_client::{
    JobReporter, LogLevel, QueueClient, QueueClientConfig,
};

/// Long-running job worker. One instance per process.
pub struct WorkerLoop {
    config: WorkerConfig,
    queue: QueueClient,
    factory: Arc<dyn DriverFactory>,
    session_timing: SessionTiming,
    processor_timing: ProcessorTiming,
}

impl WorkerLoop {
    pub fn new(config: WorkerConfig, factory: Arc<dyn DriverFactory>) -> Result<Self, WorkerError> {
        let queue = QueueClient::new(QueueClientConfig::new(config.server_url.clone()))?;
        Ok(Self {
            config,
            queue,
            factory,
            session_timing: SessionTiming::default(),
            processor_timing: ProcessorTiming::default(),
        })
    }

    #[cfg(test)]
    fn with_timings(mut self, session: SessionTiming, processor: ProcessorTiming) -> Self {
        self.session_timing = session;
        self.processor_timing = processor;
        self
    }

    /// Poll until the idle-poll ceiling is reached. Any processed job, in
    /// whatever final state, resets the idle counter.
    pub async fn run(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.config.profile_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create profile directory {}",
                    self.config.profile_dir.display()
                )
            })?;
        info!(
            "Worker started, polling {} every {}s",
            self.config.server_url, self.config.poll_interval_secs
        );

        let poll_interval = Duration::from_secs(self.config.poll_interval_secs);
        let mut idle_polls: u32 = 0;
        while idle_polls < self.config.max_polls {
            match self.queue.pending_job().await {
                Ok(Some(job)) => {
                    idle_polls = 0;
                    let status = self.process_job(&job).await;
                    info!("Job {} finished with status {status:?}", job.id);
                }
                Ok(None) => {
                    idle_polls += 1;
                    info!(
                        "No pending jobs found. Polling again in {}s (poll {idle_polls})",
                        poll_interval.as_secs()
                    );
                    sleep(poll_interval).await;
                }
                Err(e) => {
                    idle_polls += 1;
                    warn!("Queue poll failed: {e}");
                    sleep(poll_interval).await;
                }
            }
        }
        info!(
            "Reached {} consecutive empty polls, shutting down",
            self.config.max_polls
        );
        Ok(())
    }

    /// Run one job to a final status. Never fails past this boundary: every
    /// error becomes a FAILED report to the queue.
    async fn process_job(&self, job: &PendingJob) -> JobStatus {
        let reporter = JobReporter::new(self.queue.clone(), &job.id);
        reporter.info(format!("--- JOB {} RECEIVED ---", job.id));

        if let Err(e) = self
            .queue
            .update_status(&job.id, JobStatus::Running, "Worker picked up job.", None)
            .await
        {
            warn!("Could not mark job {} as running: {e}", job.id);
        }

        let bytes = match self.queue.download_file(&job.file_id).await {
            Ok(bytes) => bytes,
            Err(e) => {
                reporter.error(format!("File download failed: {e}"));
                self.finish(&job.id, JobStatus::Failed, "Could not download file from server.", None)
                    .await;
                return JobStatus::Failed;
            }
        };

        let interactive = !self.config.first_run_marker().exists();
        let (status, summary, updated_file, confirmed) =
            self.run_job(job, &bytes, interactive, &reporter).await;
        self.finish(&job.id, status, &summary, updated_file.as_deref())
            .await;

        // The flag flips only after the job reported its terminal status, so
        // a crash mid-job leaves the next run interactive.
        if interactive && confirmed {
            let marker = self.config.first_run_marker();
            if let Err(e) = fs::write(&marker, b"").await {
                warn!("Could not write first-run marker {}: {e}", marker.display());
            } else {
                reporter.info("First-time login completed; subsequent jobs run unattended.");
            }
        }
        status
    }

    /// Report the terminal status. A failed upload is logged and dropped;
    /// the queue will surface the job as stale on its side.
    async fn finish(&self, job_id: &str, status: JobStatus, summary: &str, file: Option<&[u8]>) {
        if let Err(e) = self.queue.update_status(job_id, status, summary, file).await {
            warn!("Could not report final status for job {job_id}: {e}");
        }
    }

    /// Launch a session, run the batch, and tear the session down on every
    /// path. The trailing bool reports whether the session got confirmed.
    async fn run_job(
        &self,
        job: &PendingJob,
        bytes: &[u8],
        interactive: bool,
        reporter: &JobReporter,
    ) -> (JobStatus, String, Option<Vec<u8>>, bool) {
        let driver = match self
            .factory
            .launch(&self.config.profile_dir, !interactive)
            .await
        {
            Ok(driver) => driver,
            Err(e) => {
                return (
                    JobStatus::Failed,
                    format!("Could not start browser session: {e}"),
                    None,
                    false,
                );
            }
        };

        let mode = if interactive {
            SessionMode::Interactive
        } else {
            SessionMode::Unattended
        };
        let mut session = SessionController::new(
            driver,
            &self.config.target,
            reporter,
            mode,
            Duration::from_secs(self.config.login_timeout_secs),
        )
        .with_timing(self.session_timing.clone());

        let result = self.execute(&mut session, job, bytes, reporter).await;
        let confirmed = session.state() == SessionState::Confirmed;
        session.close().await;

        match result {
            Ok((status, summary, file)) => (status, summary, file, confirmed),
            Err(e) => (JobStatus::Failed, format!("Fatal error: {e}"), None, confirmed),
        }
    }

    async fn execute(
        &self,
        session: &mut SessionController<'_>,
        job: &PendingJob,
        bytes: &[u8],
        reporter: &JobReporter,
    ) -> Result<(JobStatus, String, Option<Vec<u8>>), WorkerError> {
        session.establish().await?;

        let (mut ledger, work_set) = RowLedger::load(bytes)?;
        if work_set.is_empty() {
            reporter.info("Nothing to do: every row is already marked complete.");
            return Ok((
                JobStatus::Completed,
                "No posts to process.".to_string(),
                Some(ledger.to_bytes()?),
            ));
        }
        reporter.info(format!(
            "{} posts to process (status column: {})",
            work_set.len(),
            ledger.status_column()
        ));

        let processor = ItemProcessor::new(
            session.driver_mut(),
            &self.config.target,
            reporter,
            self.processor_timing.clone(),
        );
        let records = BatchRunner::new(processor, &mut ledger, reporter, job.delay_seconds())
            .run(&work_set)
            .await;

        let report = summary_report(&records);
        reporter.log(LogLevel::Summary, report.clone());
        let status = if records.iter().any(|r| r.is_success()) {
            JobStatus::Completed
        } else {
            JobStatus::Failed
        };
        Ok((status, report, Some(ledger.to_bytes()?)))
    }
}
