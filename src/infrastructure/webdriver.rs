//! W3C WebDriver wire client
//!
//! Thin reqwest-based implementation of the [`BrowserDriver`] capability
//! trait against a chromedriver-compatible endpoint. One instance is one
//! remote session; the factory creates the session with the persistent
//! profile directory and optional headless mode.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tokio::time::{Instant, sleep};
use tracing::{debug, info};

use crate::domain::DriverError;
use crate::infrastructure::driver::{
    BrowserDriver, DriverFactory, DriverResult, Element, InsertMethod,
};

/// W3C element identifier key in command responses.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Poll step for interactability and marker waits.
const POLL_STEP: Duration = Duration::from_millis(500);

/// Key codes: Control, Null (releases modifiers), Delete.
const CTRL_A_DELETE: &str = "\u{e009}a\u{e000}\u{e017}";

/// Factory creating WebDriver sessions against a fixed endpoint.
pub struct WebDriverFactory {
    endpoint: String,
    http: Client,
}

impl WebDriverFactory {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            http: Client::new(),
        }
    }
}

#[async_trait]
impl DriverFactory for WebDriverFactory {
    async fn launch(
        &self,
        profile_dir: &Path,
        headless: bool,
    ) -> anyhow::Result<Box<dyn BrowserDriver>> {
        let mut args = vec![
            format!("--user-data-dir={}", profile_dir.display()),
            "--disable-blink-features=AutomationControlled".to_string(),
            "--no-sandbox".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--disable-gpu".to_string(),
            "--window-size=1280,900".to_string(),
        ];
        if headless {
            args.push("--headless=new".to_string());
        }

        let body = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": args }
                }
            }
        });
        let response: Value = self
            .http
            .post(format!("{}/session", self.endpoint))
            .json(&body)
            .send()
            .await
            .context("Failed to reach the WebDriver endpoint")?
            .error_for_status()
            .context("WebDriver session creation was rejected")?
            .json()
            .await
            .context("WebDriver session response was not JSON")?;
        let session_id = response["value"]["sessionId"]
            .as_str()
            .context("WebDriver did not return a session id")?
            .to_string();
        info!("WebDriver session {session_id} started (headless: {headless})");

        let mut client = WebDriverClient {
            http: self.http.clone(),
            base: format!("{}/session/{}", self.endpoint, session_id),
            main_window: String::new(),
        };
        // Same profile hardening the interactive flow relies on.
        client
            .run_script(
                "Object.defineProperty(navigator, 'webdriver', {get: () => undefined})",
                Vec::new(),
            )
            .await?;
        client.main_window = client.window_handle().await?;
        Ok(Box::new(client))
    }
}

/// One live WebDriver session.
pub struct WebDriverClient {
    http: Client,
    base: String,
    main_window: String,
}

impl WebDriverClient {
    async fn command_post(&self, path: &str, body: Value) -> DriverResult<Value> {
        let response = self
            .http
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .map_err(DriverError::transport)?;
        Self::unwrap_value(response).await
    }

    async fn command_get(&self, path: &str) -> DriverResult<Value> {
        let response = self
            .http
            .get(format!("{}{}", self.base, path))
            .send()
            .await
            .map_err(DriverError::transport)?;
        Self::unwrap_value(response).await
    }

    async fn command_delete(&self, path: &str) -> DriverResult<Value> {
        let response = self
            .http
            .delete(format!("{}{}", self.base, path))
            .send()
            .await
            .map_err(DriverError::transport)?;
        Self::unwrap_value(response).await
    }

    /// Extract `value` from a command response, mapping protocol errors.
    async fn unwrap_value(response: reqwest::Response) -> DriverResult<Value> {
        let status = response.status();
        let mut body: Value = response.json().await.map_err(DriverError::transport)?;
        if !status.is_success() {
            return Err(DriverError::Command {
                error: body["value"]["error"]
                    .as_str()
                    .unwrap_or("unknown error")
                    .to_string(),
                message: body["value"]["message"].as_str().unwrap_or_default().to_string(),
            });
        }
        Ok(body["value"].take())
    }

    /// Locate one element by CSS selector. `Ok(None)` when absent.
    async fn find_element(&self, selector: &str) -> DriverResult<Option<Element>> {
        let result = self
            .command_post(
                "/element",
                json!({ "using": "css selector", "value": selector }),
            )
            .await;
        match result {
            Ok(value) => {
                let id = value[ELEMENT_KEY]
                    .as_str()
                    .ok_or_else(|| DriverError::protocol("element response missing id"))?
                    .to_string();
                Ok(Some(Element {
                    id,
                    selector: selector.to_string(),
                }))
            }
            Err(DriverError::Command { error, .. }) if error == "no such element" => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn element_enabled(&self, element: &Element) -> DriverResult<bool> {
        let value = self
            .command_get(&format!("/element/{}/enabled", element.id))
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn run_script(&self, script: &str, args: Vec<Value>) -> DriverResult<Value> {
        self.command_post(
            "/execute/sync",
            json!({ "script": script, "args": args }),
        )
        .await
    }

    async fn window_handle(&self) -> DriverResult<String> {
        let value = self.command_get("/window").await?;
        value
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| DriverError::protocol("window handle missing"))
    }

    fn element_arg(element: &Element) -> Value {
        json!({ ELEMENT_KEY: element.id })
    }
}

#[async_trait]
impl BrowserDriver for WebDriverClient {
    async fn goto(&mut self, url: &str) -> DriverResult<()> {
        self.command_post("/url", json!({ "url": url })).await?;
        Ok(())
    }

    async fn current_url(&mut self) -> DriverResult<String> {
        let value = self.command_get("/url").await?;
        value
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| DriverError::protocol("current url missing"))
    }

    async fn find_interactable(
        &mut self,
        selectors: &[String],
        timeout: Duration,
    ) -> DriverResult<Option<Element>> {
        let deadline = Instant::now() + timeout;
        loop {
            for selector in selectors {
                if let Some(element) = self.find_element(selector).await? {
                    if self.element_enabled(&element).await.unwrap_or(false) {
                        debug!("Selector matched and interactable: {selector}");
                        return Ok(Some(element));
                    }
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(POLL_STEP).await;
        }
    }

    async fn is_enabled(&mut self, element: &Element) -> DriverResult<bool> {
        self.element_enabled(element).await
    }

    async fn click(&mut self, element: &Element) -> DriverResult<()> {
        self.command_post(&format!("/element/{}/click", element.id), json!({}))
            .await?;
        Ok(())
    }

    async fn scroll_into_view(&mut self, element: &Element) -> DriverResult<()> {
        self.run_script(
            "arguments[0].scrollIntoView({block:'center'});",
            vec![Self::element_arg(element)],
        )
        .await?;
        Ok(())
    }

    async fn insert_text(
        &mut self,
        element: &Element,
        text: &str,
        method: InsertMethod,
    ) -> DriverResult<()> {
        match method {
            InsertMethod::Keys => {
                self.command_post(&format!("/element/{}/clear", element.id), json!({}))
                    .await?;
                self.command_post(
                    &format!("/element/{}/value", element.id),
                    json!({ "text": text }),
                )
                .await?;
            }
            InsertMethod::SelectAllAndType => {
                self.click(element).await?;
                self.command_post(
                    &format!("/element/{}/value", element.id),
                    json!({ "text": format!("{CTRL_A_DELETE}{text}") }),
                )
                .await?;
            }
            InsertMethod::Script => {
                self.run_script(
                    "arguments[0].innerText = arguments[1]; \
                     arguments[0].dispatchEvent(new Event('input', {bubbles: true}));",
                    vec![Self::element_arg(element), Value::String(text.to_string())],
                )
                .await?;
            }
        }
        Ok(())
    }

    async fn marker_present(
        &mut self,
        selectors: &[String],
        timeout: Duration,
    ) -> DriverResult<bool> {
        let deadline = Instant::now() + timeout;
        loop {
            for selector in selectors {
                if self.find_element(selector).await?.is_some() {
                    return Ok(true);
                }
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(POLL_STEP).await;
        }
    }

    async fn execute_script(&mut self, script: &str) -> DriverResult<Value> {
        self.run_script(script, Vec::new()).await
    }

    async fn open_tab(&mut self) -> DriverResult<()> {
        let value = self.command_post("/window/new", json!({ "type": "tab" })).await?;
        let handle = value["handle"]
            .as_str()
            .ok_or_else(|| DriverError::protocol("new window response missing handle"))?
            .to_string();
        self.command_post("/window", json!({ "handle": handle })).await?;
        Ok(())
    }

    async fn close_tab(&mut self) -> DriverResult<()> {
        self.command_delete("/window").await?;
        self.command_post("/window", json!({ "handle": self.main_window.clone() }))
            .await?;
        Ok(())
    }

    async fn quit(&mut self) -> DriverResult<()> {
        self.command_delete("").await?;
        info!("WebDriver session closed");
        Ok(())
    }
}
