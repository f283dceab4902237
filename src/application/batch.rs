//! Batch runner - sequential iteration over a work set
//!
//! Items run strictly one at a time. Each outcome is written back to the row
//! ledger before the next item starts, so an interrupted job leaves a ledger
//! that reflects exactly what was attempted.

use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::application::processor::ItemProcessor;
use crate::domain::{OutcomeRecord, WorkItem};
use crate::infrastructure::ledger::{RowLedger, WorkSet};
use crate::infrastructure::queue_client::{JobReporter, LogLevel};

/// Drives one job's work set through the item processor.
pub struct BatchRunner<'a> {
    processor: ItemProcessor<'a>,
    ledger: &'a mut RowLedger,
    reporter: &'a JobReporter,
    /// Base pause between items; a random jitter of 0.5..1.5s is added.
    delay_seconds: f64,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        processor: ItemProcessor<'a>,
        ledger: &'a mut RowLedger,
        reporter: &'a JobReporter,
        delay_seconds: f64,
    ) -> Self {
        Self {
            processor,
            ledger,
            reporter,
            delay_seconds,
        }
    }

    /// Process every item in order, recording each outcome in the ledger as
    /// soon as it is known.
    pub async fn run(&mut self, work_set: &WorkSet) -> Vec<OutcomeRecord> {
        let total = work_set.len();
        if work_set.is_empty() {
            self.reporter.info("No posts to process; everything is already done.");
            return Vec::new();
        }

        let mut records = Vec::with_capacity(total);
        for (index, item) in work_set.items.iter().enumerate() {
            let ordinal = index + 1;
            self.reporter.info(format!(
                "Processing post {ordinal}/{total} (row {})",
                item.row_id
            ));

            let record = self.processor.process(item, ordinal).await;
            self.ledger.mark_row(item.row_id, record.status);
            self.reporter
                .log(LogLevel::Progress, format!("Progress: {ordinal}/{total}"));
            records.push(record);

            if ordinal < total {
                self.pace(item).await;
            }
        }
        self.reporter.info("Finished processing all posts");
        records
    }

    async fn pace(&self, item: &WorkItem) {
        let pause = self.delay_seconds + 0.5 + fastrand::f64();
        if !pause.is_finite() || pause <= 0.0 {
            warn!("Skipping pacing pause after row {}", item.row_id);
            return;
        }
        self.reporter
            .info(format!("Waiting {pause:.1}s before next post..."));
        sleep(Duration::from_secs_f64(pause)).await;
    }
}

/// Human-readable job summary from the batch's outcome records.
pub fn summary_report(records: &[OutcomeRecord]) -> String {
    let total = records.len();
    let succeeded = records.iter().filter(|r| r.is_success()).count();
    let failed = total - succeeded;
    let rate = if total == 0 {
        0.0
    } else {
        succeeded as f64 / total as f64 * 100.0
    };

    let mut report = format!(
        "Processed {total} posts: {succeeded} succeeded, {failed} failed ({rate:.1}% success rate)."
    );
    if failed > 0 {
        report.push_str("\nFailed posts:");
        for record in records.iter().filter(|r| !r.is_success()) {
            report.push_str(&format!(
                "\n- Post {} (row {}): {}",
                record.ordinal, record.row_id, record.message
            ));
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::processor::ProcessorTiming;
    use crate::domain::OutcomeStatus;
    use crate::infrastructure::config::TargetConfig;
    use crate::infrastructure::driver::testing::FakeDriver;
    use crate::infrastructure::ledger::{FAILURE_MARKER, SUCCESS_MARKER};

    fn sheet() -> Vec<u8> {
        b"postUrl,Generated comment,Commented (Y/N)\n\
          https://x.com/a/status/1,Nice thread,\n\
          https://x.com/a/status/2,Well said,\n\
          https://x.com/a/status/3,Agreed,Y\n"
            .to_vec()
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_are_written_back_per_item() {
        let target = TargetConfig::default();
        let reporter = JobReporter::disconnected("test-job");
        let mut fake = FakeDriver::new();
        fake.fail_urls.insert("https://x.com/a/status/2".to_string());

        let (mut ledger, work_set) = RowLedger::load(&sheet()).expect("load");
        assert_eq!(work_set.len(), 2);

        let processor =
            ItemProcessor::new(&mut fake, &target, &reporter, ProcessorTiming::fast());
        let records = BatchRunner::new(processor, &mut ledger, &reporter, 0.0)
            .run(&work_set)
            .await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, OutcomeStatus::Success);
        assert_eq!(records[1].status, OutcomeStatus::Failed);
        assert_eq!(ledger.status_of(0), Some(SUCCESS_MARKER));
        assert_eq!(ledger.status_of(1), Some(FAILURE_MARKER));
        assert_eq!(ledger.status_of(2), Some("Y"));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_work_set_is_a_no_op() {
        let target = TargetConfig::default();
        let reporter = JobReporter::disconnected("test-job");
        let mut fake = FakeDriver::new();
        let state = fake.state();

        let sheet = b"postUrl,Generated comment,Commented (Y/N)\n\
                      https://x.com/a/status/1,Done already,Y\n";
        let (mut ledger, work_set) = RowLedger::load(sheet).expect("load");

        let processor =
            ItemProcessor::new(&mut fake, &target, &reporter, ProcessorTiming::fast());
        let records = BatchRunner::new(processor, &mut ledger, &reporter, 0.0)
            .run(&work_set)
            .await;

        assert!(records.is_empty());
        assert_eq!(state.lock().expect("state").tabs_opened, 0);
    }

    #[test]
    fn summary_lists_failures() {
        let item_ok = crate::domain::WorkItem {
            row_id: 0,
            url: "https://x.com/a/status/1".to_string(),
            comment: "ok".to_string(),
        };
        let item_bad = crate::domain::WorkItem {
            row_id: 3,
            url: "https://x.com/a/status/2".to_string(),
            comment: "bad".to_string(),
        };
        let records = vec![
            OutcomeRecord::success(1, &item_ok, "Reply posted successfully"),
            OutcomeRecord::failed(2, &item_bad, "Attempt 3 failed: no reply affordance"),
        ];

        let report = summary_report(&records);
        assert!(report.contains("2 posts"));
        assert!(report.contains("50.0% success rate"));
        assert!(report.contains("- Post 2 (row 3): Attempt 3 failed"));
    }

    #[test]
    fn summary_of_empty_batch() {
        let report = summary_report(&[]);
        assert!(report.contains("0 posts"));
        assert!(report.contains("0.0% success rate"));
    }
}
