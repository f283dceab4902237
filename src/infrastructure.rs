//! Infrastructure layer for queue communication, tabular data and the browser driver
//!
//! Everything here talks to the outside world: the hosted job queue, the
//! WebDriver endpoint, the filesystem (config, profile directory) and the
//! tabular work-order codec.

pub mod config;
pub mod driver;
pub mod ledger;
pub mod logging;
pub mod queue_client;
pub mod webdriver;
