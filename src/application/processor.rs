//! Item processor - one work item, bounded retries, isolated attempts
//!
//! Each attempt runs in its own tab, torn down on every path, so a broken
//! page state never leaks into the next attempt or the next item. Backoff
//! between attempts is plain exponential (1s, 2s); the randomized pacing
//! between items lives in the batch runner.
//!
//! `process` never fails past its own boundary: exhausted retries become a
//! failed outcome record, nothing propagates.

use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::{DriverError, OutcomeRecord, WorkItem};
use crate::infrastructure::config::TargetConfig;
use crate::infrastructure::driver::{BrowserDriver, Element, InsertMethod};
use crate::infrastructure::queue_client::JobReporter;

/// Attempts per item, including the first.
const MAX_ATTEMPTS: u32 = 3;

/// Failure of a single attempt. Subject to the retry loop, never escalated.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("no reply affordance became interactable within {}s", waited.as_secs())]
    AffordanceNotFound { waited: Duration },

    #[error("no compose surface became interactable within {}s", waited.as_secs())]
    ComposeNotFound { waited: Duration },

    #[error("no enabled submit affordance appeared within {}s per candidate", waited.as_secs())]
    SubmitNotFound { waited: Duration },

    #[error("all text insertion methods failed")]
    TextInsertFailed,

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Wait and pause knobs for one submission attempt.
#[derive(Debug, Clone)]
pub struct ProcessorTiming {
    /// Page settle delay after navigating to the item URL.
    pub settle: Duration,
    /// Short pause after scrolls and focus clicks.
    pub short_pause: Duration,
    /// Pause after opening the reply dialog and before the submit search.
    pub interact_pause: Duration,
    /// Wait after clicking submit, before the confirmation check.
    pub post_submit_wait: Duration,
    /// Wait budget for the reply affordance.
    pub reply_wait: Duration,
    /// Wait budget for the compose surface.
    pub compose_wait: Duration,
    /// Wait budget per submit candidate.
    pub submit_wait: Duration,
    /// Wait budget for the advisory success check.
    pub confirm_wait: Duration,
    /// First retry backoff; doubles per attempt.
    pub backoff_base: Duration,
}

impl Default for ProcessorTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(3),
            short_pause: Duration::from_secs(1),
            interact_pause: Duration::from_secs(2),
            post_submit_wait: Duration::from_secs(5),
            reply_wait: Duration::from_secs(15),
            compose_wait: Duration::from_secs(10),
            submit_wait: Duration::from_secs(8),
            confirm_wait: Duration::from_secs(3),
            backoff_base: Duration::from_secs(1),
        }
    }
}

impl ProcessorTiming {
    /// Zeroed waits for tests.
    pub fn fast() -> Self {
        Self {
            settle: Duration::ZERO,
            short_pause: Duration::ZERO,
            interact_pause: Duration::ZERO,
            post_submit_wait: Duration::ZERO,
            reply_wait: Duration::ZERO,
            compose_wait: Duration::ZERO,
            submit_wait: Duration::ZERO,
            confirm_wait: Duration::ZERO,
            backoff_base: Duration::ZERO,
        }
    }
}

/// Executes single work items against the browser session.
pub struct ItemProcessor<'a> {
    driver: &'a mut dyn BrowserDriver,
    target: &'a TargetConfig,
    reporter: &'a JobReporter,
    timing: ProcessorTiming,
}

impl<'a> ItemProcessor<'a> {
    pub fn new(
        driver: &'a mut dyn BrowserDriver,
        target: &'a TargetConfig,
        reporter: &'a JobReporter,
        timing: ProcessorTiming,
    ) -> Self {
        Self {
            driver,
            target,
            reporter,
            timing,
        }
    }

    /// Process one item to a final outcome. Never raises past this boundary.
    pub async fn process(&mut self, item: &WorkItem, ordinal: usize) -> OutcomeRecord {
        let mut last_message = String::from("no attempt was made");
        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(item).await {
                Ok(()) => {
                    self.reporter
                        .info(format!("✓ Post {ordinal}: reply posted successfully"));
                    return OutcomeRecord::success(ordinal, item, "Reply posted successfully");
                }
                Err(e) => {
                    last_message = format!("Attempt {attempt} failed: {e}");
                    self.reporter.error(format!("✗ Post {ordinal}: {last_message}"));
                }
            }
            if attempt < MAX_ATTEMPTS {
                let backoff = self.timing.backoff_base * 2u32.pow(attempt - 1);
                self.reporter
                    .info(format!("Retrying in {}s...", backoff.as_secs()));
                sleep(backoff).await;
            }
        }
        OutcomeRecord::failed(ordinal, item, last_message)
    }

    /// One isolated attempt. The item tab is closed on every path before the
    /// next attempt or the next item.
    async fn attempt(&mut self, item: &WorkItem) -> Result<(), AttemptError> {
        self.driver.open_tab().await?;
        let outcome = self.submit_reply(item).await;
        if let Err(e) = self.driver.close_tab().await {
            warn!("Could not close item tab: {e}");
        }
        outcome
    }

    async fn submit_reply(&mut self, item: &WorkItem) -> Result<(), AttemptError> {
        let target = self.target;
        self.driver.goto(&item.url).await?;
        sleep(self.timing.settle).await;

        let reply = self
            .driver
            .find_interactable(&target.reply_selectors, self.timing.reply_wait)
            .await?
            .ok_or(AttemptError::AffordanceNotFound {
                waited: self.timing.reply_wait,
            })?;
        self.driver.scroll_into_view(&reply).await?;
        sleep(self.timing.short_pause).await;
        self.driver.click(&reply).await?;
        sleep(self.timing.interact_pause).await;

        let compose = self
            .driver
            .find_interactable(&target.compose_selectors, self.timing.compose_wait)
            .await?
            .ok_or(AttemptError::ComposeNotFound {
                waited: self.timing.compose_wait,
            })?;
        self.driver.click(&compose).await?;
        sleep(self.timing.short_pause).await;
        self.insert_comment(&compose, &item.comment).await?;

        sleep(self.timing.interact_pause).await;
        let submit = self.find_enabled_submit().await?;
        self.driver.scroll_into_view(&submit).await?;
        sleep(self.timing.short_pause).await;
        self.driver.click(&submit).await?;
        sleep(self.timing.post_submit_wait).await;

        // Advisory only: the reply may have landed with markers not yet
        // rendered, so absence of confirmation does not fail the attempt.
        match self
            .driver
            .marker_present(&target.success_markers, self.timing.confirm_wait)
            .await
        {
            Ok(true) => debug!("Reply confirmed via page markers"),
            Ok(false) => self
                .reporter
                .warning("Could not verify the reply rendered; assuming success"),
            Err(e) => self
                .reporter
                .warning(format!("Confirmation check failed: {e}")),
        }
        Ok(())
    }

    /// Try the insertion strategies in order; the first that sticks wins.
    async fn insert_comment(&mut self, compose: &Element, comment: &str) -> Result<(), AttemptError> {
        for method in InsertMethod::ORDERED {
            match self.driver.insert_text(compose, comment, method).await {
                Ok(()) => {
                    debug!("Comment text entered via {method:?}");
                    return Ok(());
                }
                Err(e) => debug!("Insert method {method:?} failed: {e}"),
            }
        }
        Err(AttemptError::TextInsertFailed)
    }

    /// Ordered submit candidate search, skipping matches that are disabled.
    async fn find_enabled_submit(&mut self) -> Result<Element, AttemptError> {
        let target = self.target;
        for selector in &target.submit_selectors {
            let Some(element) = self
                .driver
                .find_interactable(std::slice::from_ref(selector), self.timing.submit_wait)
                .await?
            else {
                continue;
            };
            if self.driver.is_enabled(&element).await? {
                return Ok(element);
            }
            debug!("Submit affordance found but disabled: {selector}");
        }
        Err(AttemptError::SubmitNotFound {
            waited: self.timing.submit_wait,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::OutcomeStatus;
    use crate::infrastructure::driver::testing::FakeDriver;

    fn item() -> WorkItem {
        WorkItem {
            row_id: 4,
            url: "https://x.com/someone/status/1".to_string(),
            comment: "Great point!".to_string(),
        }
    }

    fn reporter() -> JobReporter {
        JobReporter::disconnected("test-job")
    }

    #[tokio::test(start_paused = true)]
    async fn successful_item_uses_one_tab() {
        let target = TargetConfig::default();
        let reporter = reporter();
        let mut fake = FakeDriver::new();
        let state = fake.state();

        let record = ItemProcessor::new(&mut fake, &target, &reporter, ProcessorTiming::fast())
            .process(&item(), 1)
            .await;

        assert_eq!(record.status, OutcomeStatus::Success);
        assert_eq!(record.row_id, 4);
        let state = state.lock().expect("state");
        assert_eq!(state.tabs_opened, 1);
        assert_eq!(state.tabs_closed, 1);
        assert_eq!(state.inserted, vec![(
            "[data-testid='tweetTextarea_0']".to_string(),
            "Great point!".to_string()
        )]);
        assert!(state.clicks.iter().any(|c| c == "[data-testid='reply']"));
        assert!(state.clicks.iter().any(|c| c == "[data-testid='tweetButton']"));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_make_three_attempts_with_exponential_backoff() {
        let target = TargetConfig::default();
        let reporter = reporter();
        let mut fake = FakeDriver::new();
        fake.fail_urls.insert(item().url);
        let state = fake.state();

        let timing = ProcessorTiming {
            backoff_base: Duration::from_secs(1),
            ..ProcessorTiming::fast()
        };
        let start = tokio::time::Instant::now();
        let record = ItemProcessor::new(&mut fake, &target, &reporter, timing)
            .process(&item(), 1)
            .await;
        let elapsed = start.elapsed();

        assert_eq!(record.status, OutcomeStatus::Failed);
        assert!(record.message.contains("Attempt 3"));
        let state = state.lock().expect("state");
        assert_eq!(state.tabs_opened, 3);
        assert_eq!(state.tabs_closed, 3);
        // Backoff of 1s then 2s between the three attempts; nothing after
        // the last one.
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn insert_falls_back_to_later_methods() {
        let target = TargetConfig::default();
        let reporter = reporter();
        let mut fake = FakeDriver::new();
        fake.failing_insert_methods.insert(InsertMethod::Keys);
        fake.failing_insert_methods.insert(InsertMethod::SelectAllAndType);
        let state = fake.state();

        let record = ItemProcessor::new(&mut fake, &target, &reporter, ProcessorTiming::fast())
            .process(&item(), 1)
            .await;

        assert_eq!(record.status, OutcomeStatus::Success);
        assert_eq!(state.lock().expect("state").inserted.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn all_insert_methods_failing_fails_the_item() {
        let target = TargetConfig::default();
        let reporter = reporter();
        let mut fake = FakeDriver::new();
        for method in InsertMethod::ORDERED {
            fake.failing_insert_methods.insert(method);
        }

        let record = ItemProcessor::new(&mut fake, &target, &reporter, ProcessorTiming::fast())
            .process(&item(), 1)
            .await;

        assert_eq!(record.status, OutcomeStatus::Failed);
        assert!(record.message.contains("text insertion"));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_submit_candidates_are_skipped() {
        let target = TargetConfig::default();
        let reporter = reporter();
        let mut fake = FakeDriver::new();
        fake.disabled_selectors
            .insert("[data-testid='tweetButton']".to_string());
        let state = fake.state();

        let record = ItemProcessor::new(&mut fake, &target, &reporter, ProcessorTiming::fast())
            .process(&item(), 1)
            .await;

        assert_eq!(record.status, OutcomeStatus::Success);
        let state = state.lock().expect("state");
        assert!(state.clicks.iter().any(|c| c == "[data-testid='tweetButtonInline']"));
    }
}
