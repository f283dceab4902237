//! Browser driver capability seam
//!
//! The session controller and item processor only ever talk to this trait, so
//! the page-driving core is independent of the concrete automation backend.
//! Production uses the WebDriver wire client; tests substitute a fake.
//!
//! "Element not found" is an explicit `Ok(None)` outcome rather than an
//! error: which role a missing element was playing (reply, compose, submit)
//! is for the caller to decide.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::DriverError;

pub type DriverResult<T> = Result<T, DriverError>;

/// Handle to a located page element.
#[derive(Debug, Clone)]
pub struct Element {
    /// Backend-specific element id.
    pub id: String,
    /// The candidate selector that matched.
    pub selector: String,
}

/// Ordered text-insertion strategies, tried first-to-last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertMethod {
    /// Clear the surface, then type the text.
    Keys,
    /// Select-all + delete key chord, then type. Helps with contenteditable
    /// surfaces that ignore clear().
    SelectAllAndType,
    /// Set the text from script and fire an input event.
    Script,
}

impl InsertMethod {
    /// All strategies in fallback order.
    pub const ORDERED: [Self; 3] = [Self::Keys, Self::SelectAllAndType, Self::Script];
}

/// One live browser session.
#[async_trait]
pub trait BrowserDriver: Send {
    async fn goto(&mut self, url: &str) -> DriverResult<()>;

    async fn current_url(&mut self) -> DriverResult<String>;

    /// Poll the ordered candidate selectors until one is present and enabled,
    /// or the wait budget runs out (`Ok(None)`).
    async fn find_interactable(
        &mut self,
        selectors: &[String],
        timeout: Duration,
    ) -> DriverResult<Option<Element>>;

    async fn is_enabled(&mut self, element: &Element) -> DriverResult<bool>;

    async fn click(&mut self, element: &Element) -> DriverResult<()>;

    async fn scroll_into_view(&mut self, element: &Element) -> DriverResult<()>;

    async fn insert_text(
        &mut self,
        element: &Element,
        text: &str,
        method: InsertMethod,
    ) -> DriverResult<()>;

    /// Whether any of the marker selectors shows up within the wait budget.
    async fn marker_present(
        &mut self,
        selectors: &[String],
        timeout: Duration,
    ) -> DriverResult<bool>;

    async fn execute_script(&mut self, script: &str) -> DriverResult<serde_json::Value>;

    /// Open an isolated tab for one item and switch to it.
    async fn open_tab(&mut self) -> DriverResult<()>;

    /// Close the item tab and switch back to the main window.
    async fn close_tab(&mut self) -> DriverResult<()>;

    /// Tear the session down. Called exactly once per job.
    async fn quit(&mut self) -> DriverResult<()>;
}

/// Launches browser sessions. The worker loop owns one factory for its whole
/// lifetime; each job gets a fresh session against the shared profile.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn launch(
        &self,
        profile_dir: &Path,
        headless: bool,
    ) -> anyhow::Result<Box<dyn BrowserDriver>>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory driver for exercising the session, processor and
    //! batch layers without a browser.

    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};

    /// Shared recording of everything the fake driver was asked to do.
    #[derive(Debug, Default)]
    pub struct FakeState {
        pub navigations: Vec<String>,
        pub tabs_opened: u32,
        pub tabs_closed: u32,
        pub clicks: Vec<String>,
        pub inserted: Vec<(String, String)>,
        pub scripts: Vec<String>,
        pub quit_calls: u32,
    }

    /// Configurable fake [`BrowserDriver`].
    pub struct FakeDriver {
        pub state: Arc<Mutex<FakeState>>,
        /// URLs on which every element search comes up empty.
        pub fail_urls: HashSet<String>,
        /// Selectors that resolve but report disabled.
        pub disabled_selectors: HashSet<String>,
        /// Result of passive marker checks (login and success markers).
        pub markers_present: bool,
        /// Whether the injected login overlay reports as present.
        pub overlay_present: bool,
        /// Value the login-confirmation flag script returns.
        pub login_flag: Option<String>,
        /// Insert methods that fail, by position in `InsertMethod::ORDERED`.
        pub failing_insert_methods: HashSet<InsertMethod>,
        /// When set, every navigation lands here instead (simulates the site
        /// bouncing an unauthenticated session to its login page).
        pub redirect_to: Option<String>,
        current_url: String,
    }

    impl FakeDriver {
        pub fn new() -> Self {
            Self {
                state: Arc::new(Mutex::new(FakeState::default())),
                fail_urls: HashSet::new(),
                disabled_selectors: HashSet::new(),
                markers_present: true,
                overlay_present: true,
                login_flag: None,
                failing_insert_methods: HashSet::new(),
                redirect_to: None,
                current_url: String::new(),
            }
        }

        pub fn state(&self) -> Arc<Mutex<FakeState>> {
            Arc::clone(&self.state)
        }

        fn on_fail_url(&self) -> bool {
            self.fail_urls.contains(&self.current_url)
        }
    }

    #[async_trait]
    impl BrowserDriver for FakeDriver {
        async fn goto(&mut self, url: &str) -> DriverResult<()> {
            self.current_url = self
                .redirect_to
                .clone()
                .unwrap_or_else(|| url.to_string());
            self.state.lock().expect("state").navigations.push(url.to_string());
            Ok(())
        }

        async fn current_url(&mut self) -> DriverResult<String> {
            Ok(self.current_url.clone())
        }

        async fn find_interactable(
            &mut self,
            selectors: &[String],
            _timeout: Duration,
        ) -> DriverResult<Option<Element>> {
            if self.on_fail_url() {
                return Ok(None);
            }
            for selector in selectors {
                let element = Element {
                    id: format!("el-{selector}"),
                    selector: selector.clone(),
                };
                if !self.disabled_selectors.contains(selector) {
                    return Ok(Some(element));
                }
            }
            // Everything matched but disabled: surface the first match so the
            // caller can run its own enabled check.
            Ok(selectors.first().map(|s| Element {
                id: format!("el-{s}"),
                selector: s.clone(),
            }))
        }

        async fn is_enabled(&mut self, element: &Element) -> DriverResult<bool> {
            Ok(!self.disabled_selectors.contains(&element.selector))
        }

        async fn click(&mut self, element: &Element) -> DriverResult<()> {
            self.state.lock().expect("state").clicks.push(element.selector.clone());
            Ok(())
        }

        async fn scroll_into_view(&mut self, _element: &Element) -> DriverResult<()> {
            Ok(())
        }

        async fn insert_text(
            &mut self,
            element: &Element,
            text: &str,
            method: InsertMethod,
        ) -> DriverResult<()> {
            if self.failing_insert_methods.contains(&method) {
                return Err(DriverError::Command {
                    error: "element not interactable".to_string(),
                    message: format!("cannot type into {}", element.selector),
                });
            }
            self.state
                .lock()
                .expect("state")
                .inserted
                .push((element.selector.clone(), text.to_string()));
            Ok(())
        }

        async fn marker_present(
            &mut self,
            _selectors: &[String],
            _timeout: Duration,
        ) -> DriverResult<bool> {
            Ok(self.markers_present && !self.on_fail_url())
        }

        async fn execute_script(&mut self, script: &str) -> DriverResult<serde_json::Value> {
            self.state.lock().expect("state").scripts.push(script.to_string());
            if script.contains("getElementById('courier-login-overlay')") && script.starts_with("return") {
                return Ok(serde_json::Value::Bool(self.overlay_present));
            }
            if script.contains("getItem('courier_login_ok')") {
                return Ok(self
                    .login_flag
                    .clone()
                    .map_or(serde_json::Value::Null, serde_json::Value::String));
            }
            Ok(serde_json::Value::Null)
        }

        async fn open_tab(&mut self) -> DriverResult<()> {
            self.state.lock().expect("state").tabs_opened += 1;
            Ok(())
        }

        async fn close_tab(&mut self) -> DriverResult<()> {
            self.state.lock().expect("state").tabs_closed += 1;
            Ok(())
        }

        async fn quit(&mut self) -> DriverResult<()> {
            self.state.lock().expect("state").quit_calls += 1;
            Ok(())
        }
    }

    /// Factory handing out pre-built fakes, for worker-loop tests.
    pub struct FakeFactory {
        drivers: Mutex<Vec<FakeDriver>>,
    }

    impl FakeFactory {
        pub fn new(drivers: Vec<FakeDriver>) -> Self {
            Self {
                drivers: Mutex::new(drivers),
            }
        }
    }

    #[async_trait]
    impl DriverFactory for FakeFactory {
        async fn launch(
            &self,
            _profile_dir: &Path,
            _headless: bool,
        ) -> anyhow::Result<Box<dyn BrowserDriver>> {
            let driver = self
                .drivers
                .lock()
                .expect("drivers")
                .pop()
                .ok_or_else(|| anyhow::anyhow!("no scripted driver left"))?;
            Ok(Box::new(driver))
        }
    }
}
