//! Session controller - authenticated-session lifecycle for one job
//!
//! State machine: `Unauthenticated -> AwaitingConfirmation -> Confirmed`
//! (terminal) or `TimedOut` (terminal, fatal for the job).
//!
//! Two confirmation channels race in interactive mode: a passive check
//! against known logged-in page markers, and an explicit on-page overlay
//! button that sets a localStorage flag. The overlay lives on a page that can
//! navigate away at any moment, so it is re-injected whenever it is found
//! missing or the URL changed.
//!
//! Unattended mode trusts the persisted profile: one passive pass, accept or
//! reject immediately, no waiting loop.

use std::time::Duration;

use serde_json::Value;
use tokio::time::{Instant, sleep};
use tracing::debug;

use crate::domain::WorkerError;
use crate::infrastructure::config::TargetConfig;
use crate::infrastructure::driver::BrowserDriver;
use crate::infrastructure::queue_client::JobReporter;

const OVERLAY_PRESENT_SCRIPT: &str =
    "return !!document.getElementById('courier-login-overlay');";
const LOGIN_FLAG_SCRIPT: &str =
    "return window.localStorage.getItem('courier_login_ok');";
const CLEAR_FLAG_SCRIPT: &str = "window.localStorage.removeItem('courier_login_ok');";
const REMOVE_OVERLAY_SCRIPT: &str =
    "var el = document.getElementById('courier-login-overlay'); if (el) { el.remove(); }";

/// Floating confirmation panel injected into the login page. The button sets
/// the flag read by `LOGIN_FLAG_SCRIPT` and removes the panel.
const OVERLAY_SCRIPT: &str = r#"
(function() {
  if (document.getElementById('courier-login-overlay')) { return; }
  var wrap = document.createElement('div');
  wrap.id = 'courier-login-overlay';
  wrap.style.cssText = 'position:fixed;right:20px;bottom:20px;z-index:999999;' +
    'background:rgba(20,20,20,0.92);color:#fff;padding:16px;border-radius:16px;' +
    'box-shadow:0 8px 24px rgba(0,0,0,0.35);max-width:320px;' +
    'font-family:system-ui,-apple-system,Segoe UI,Roboto,sans-serif;';
  var msg = document.createElement('div');
  msg.textContent = 'Log in in this window, then click the button below to continue.';
  msg.style.cssText = 'font-size:13px;opacity:0.9;margin-bottom:12px;';
  var btn = document.createElement('button');
  btn.textContent = "I'm logged in";
  btn.style.cssText = 'width:100%;padding:10px 12px;border-radius:12px;border:none;' +
    'cursor:pointer;font-weight:600;font-size:14px;background:#8B5CF6;color:#fff;';
  btn.addEventListener('click', function() {
    try { window.localStorage.setItem('courier_login_ok', '1'); } catch (e) {}
    wrap.remove();
  }, { once: true });
  wrap.appendChild(msg);
  wrap.appendChild(btn);
  document.documentElement.appendChild(wrap);
})();
"#;

/// How the session gets confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// First run: a visible window, manual login, overlay confirmation.
    Interactive,
    /// Subsequent runs: trust the persisted profile, no waiting loop.
    Unattended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    AwaitingConfirmation,
    Confirmed,
    TimedOut,
}

/// Wait knobs for the confirmation loop.
#[derive(Debug, Clone)]
pub struct SessionTiming {
    /// Page settle delay after navigation.
    pub settle: Duration,
    /// Pause between confirmation loop passes.
    pub poll_interval: Duration,
    /// Wait budget for one passive marker check.
    pub passive_wait: Duration,
    /// How often to log that we are still waiting.
    pub waiting_log_every: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            settle: Duration::from_secs(3),
            poll_interval: Duration::from_secs(1),
            passive_wait: Duration::from_secs(5),
            waiting_log_every: Duration::from_secs(10),
        }
    }
}

impl SessionTiming {
    /// Zeroed waits for tests.
    pub fn fast() -> Self {
        Self {
            settle: Duration::ZERO,
            poll_interval: Duration::ZERO,
            passive_wait: Duration::ZERO,
            waiting_log_every: Duration::from_secs(10),
        }
    }
}

/// Owns the browser session for exactly one job.
pub struct SessionController<'a> {
    driver: Box<dyn BrowserDriver>,
    target: &'a TargetConfig,
    reporter: &'a JobReporter,
    mode: SessionMode,
    login_timeout: Duration,
    timing: SessionTiming,
    state: SessionState,
}

impl<'a> SessionController<'a> {
    pub fn new(
        driver: Box<dyn BrowserDriver>,
        target: &'a TargetConfig,
        reporter: &'a JobReporter,
        mode: SessionMode,
        login_timeout: Duration,
    ) -> Self {
        Self {
            driver,
            target,
            reporter,
            mode,
            login_timeout,
            timing: SessionTiming::default(),
            state: SessionState::Unauthenticated,
        }
    }

    pub fn with_timing(mut self, timing: SessionTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Borrow the underlying driver for batch processing. Only meaningful
    /// after `establish` succeeded.
    pub fn driver_mut(&mut self) -> &mut dyn BrowserDriver {
        &mut *self.driver
    }

    /// Establish and confirm the session, or fail the job.
    pub async fn establish(&mut self) -> Result<(), WorkerError> {
        match self.mode {
            SessionMode::Unattended => self.establish_unattended().await,
            SessionMode::Interactive => self.establish_interactive().await,
        }
    }

    /// Tear the session down. Runs exactly once per job; errors are logged,
    /// never propagated, since teardown sits on every exit path.
    pub async fn close(mut self) {
        match self.driver.quit().await {
            Ok(()) => self.reporter.info("Browser closed"),
            Err(e) => self.reporter.warning(format!("Error closing browser: {e}")),
        }
    }

    async fn establish_unattended(&mut self) -> Result<(), WorkerError> {
        self.reporter
            .info("Unattended mode: verifying saved profile session...");
        self.driver.goto(&self.target.home_url).await?;
        sleep(self.timing.settle).await;

        if self.passive_check().await? {
            self.state = SessionState::Confirmed;
            self.reporter.info("Login confirmed from saved profile");
            Ok(())
        } else {
            self.reporter
                .error("Saved profile is not logged in; aborting job");
            Err(WorkerError::LoginRejected)
        }
    }

    async fn establish_interactive(&mut self) -> Result<(), WorkerError> {
        self.driver.goto(&self.target.entry_url).await?;
        self.reporter.info(
            "LOGIN FLOW: 1) log in in the opened window  2) click the floating \
             'I'm logged in' button to continue",
        );
        self.inject_overlay().await;
        self.state = SessionState::AwaitingConfirmation;

        let deadline = Instant::now() + self.login_timeout;
        let mut last_url = String::new();
        let mut last_waiting_log = Instant::now();
        loop {
            // The page may have navigated and destroyed the overlay.
            let overlay_present = match self.driver.execute_script(OVERLAY_PRESENT_SCRIPT).await {
                Ok(value) => value.as_bool().unwrap_or(true),
                Err(_) => true,
            };
            let current_url = self
                .driver
                .current_url()
                .await
                .unwrap_or_else(|_| last_url.clone());
            if !overlay_present || current_url != last_url {
                self.inject_overlay().await;
            }
            last_url = current_url;

            let flag_set = matches!(
                self.driver.execute_script(LOGIN_FLAG_SCRIPT).await,
                Ok(Value::String(flag)) if flag == "1"
            );
            if flag_set {
                self.reporter.info("Login confirmed via overlay button");
                let _ = self.driver.execute_script(CLEAR_FLAG_SCRIPT).await;
                let _ = self.driver.execute_script(REMOVE_OVERLAY_SCRIPT).await;
                self.state = SessionState::Confirmed;
                return Ok(());
            }

            if self.passive_check().await.unwrap_or(false) {
                self.reporter.info("Login auto-confirmed via page markers");
                let _ = self.driver.execute_script(REMOVE_OVERLAY_SCRIPT).await;
                self.state = SessionState::Confirmed;
                return Ok(());
            }

            if Instant::now() >= deadline {
                let minutes = self.login_timeout.as_secs() / 60;
                self.reporter
                    .error(format!("Login wait timed out after {minutes} minutes"));
                self.state = SessionState::TimedOut;
                return Err(WorkerError::LoginTimeout { minutes });
            }

            if last_waiting_log.elapsed() >= self.timing.waiting_log_every {
                self.reporter.info(
                    "Waiting for login confirmation... (click the overlay button when ready)",
                );
                last_waiting_log = Instant::now();
            }
            sleep(self.timing.poll_interval).await;
        }
    }

    /// Passive channel: known logged-in markers, then a URL shape fallback.
    async fn passive_check(&mut self) -> Result<bool, WorkerError> {
        if self
            .driver
            .marker_present(&self.target.login_markers, self.timing.passive_wait)
            .await?
        {
            return Ok(true);
        }
        let url = self.driver.current_url().await?;
        Ok(url.contains("/home") || (url.contains(&self.target.host) && !url.contains("/login")))
    }

    async fn inject_overlay(&mut self) {
        if let Err(e) = self.driver.execute_script(OVERLAY_SCRIPT).await {
            debug!("Could not inject login overlay: {e}");
        }
    }
}
