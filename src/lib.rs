//! reply-courier: unattended reply-posting worker
//!
//! Polls a hosted job queue, downloads each job's CSV work order, posts one
//! reply per eligible row through a persistent browser session, and reports
//! the outcome back with the per-row status column updated.
//!
//! Layering follows the dependency direction domain <- application <-
//! infrastructure adapters:
//! - `domain`: job, work-item and outcome types plus the error taxonomy
//! - `application`: session, item, batch and worker orchestration
//! - `infrastructure`: queue HTTP client, CSV row ledger, WebDriver client,
//!   configuration and logging

pub mod application;
pub mod domain;
pub mod infrastructure;

use std::sync::Arc;

use application::worker::WorkerLoop;
use infrastructure::config::WorkerConfig;
use infrastructure::webdriver::WebDriverFactory;

/// Load configuration and run the worker loop until the idle-poll ceiling.
pub async fn run() -> anyhow::Result<()> {
    infrastructure::logging::init();

    let config = WorkerConfig::load().await?;
    let factory = Arc::new(WebDriverFactory::new(config.webdriver_url.clone()));
    let worker = WorkerLoop::new(config, factory)?;
    worker.run().await
}
