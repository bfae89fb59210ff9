//! Minimal W3C WebDriver client used to drive the application under test

use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::driver::DriverConfig;
use crate::error::{E2eError, E2eResult};
use crate::page::Page;

/// Delay between page reads while waiting on a matcher
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A live browser session bound to one application base URL
pub struct BrowserSession {
    client: reqwest::Client,
    webdriver_url: String,
    session_id: String,
    app_url: String,
    driver_name: String,
    max_wait: Duration,
}

impl BrowserSession {
    /// Open a session on `webdriver_url` using `driver`'s capabilities
    pub async fn start(
        webdriver_url: &str,
        driver: &DriverConfig,
        app_url: &str,
        max_wait: Duration,
    ) -> E2eResult<Self> {
        let client = reqwest::Client::new();
        let webdriver_url = webdriver_url.trim_end_matches('/').to_string();

        info!("Opening '{}' browser session via {}", driver.name, webdriver_url);

        let resp = client
            .post(format!("{}/session", webdriver_url))
            .json(&driver.capabilities())
            .send()
            .await?;
        let value = unwrap_value(resp).await?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| E2eError::WebDriver("new session response has no sessionId".to_string()))?
            .to_string();

        let session = Self {
            client,
            webdriver_url,
            session_id,
            app_url: app_url.trim_end_matches('/').to_string(),
            driver_name: driver.name.clone(),
            max_wait,
        };

        session
            .command(
                reqwest::Method::POST,
                "timeouts",
                Some(json!({ "implicit": max_wait.as_millis() as u64 })),
            )
            .await?;

        debug!("Browser session {} ready", session.session_id);
        Ok(session)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    /// Navigate to `path` relative to the application base URL
    pub async fn visit(&self, path: &str) -> E2eResult<()> {
        let url = if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.app_url, path.trim_start_matches('/'))
        };
        debug!("visit {}", url);
        self.command(reqwest::Method::POST, "url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    pub async fn current_url(&self) -> E2eResult<String> {
        let value = self.command(reqwest::Method::GET, "url", None).await?;
        value
            .as_str()
            .map(String::from)
            .ok_or_else(|| E2eError::WebDriver("current url is not a string".to_string()))
    }

    /// Snapshot the current DOM
    pub async fn page(&self) -> E2eResult<Page> {
        let value = self.command(reqwest::Method::GET, "source", None).await?;
        value
            .as_str()
            .map(Page::new)
            .ok_or_else(|| E2eError::WebDriver("page source is not a string".to_string()))
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Re-read the page until `check` passes or the max wait runs out.
    ///
    /// Only assertion failures are retried; the last one is returned on
    /// timeout. Any other error ends the wait at once.
    pub async fn wait_for<F>(&self, check: F) -> E2eResult<Page>
    where
        F: Fn(&Page) -> E2eResult<()>,
    {
        let deadline = Instant::now() + self.max_wait;

        loop {
            let page = self.page().await?;
            match check(&page) {
                Ok(()) => return Ok(page),
                Err(E2eError::AssertionFailed(msg)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        debug!("Gave up waiting after {:?}", self.max_wait);
                        return Err(E2eError::AssertionFailed(msg));
                    }
                    sleep(POLL_INTERVAL.min(deadline - now)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// End the WebDriver session
    pub async fn quit(&self) -> E2eResult<()> {
        info!("Closing browser session {}", self.session_id);
        let resp = self
            .client
            .delete(format!("{}/session/{}", self.webdriver_url, self.session_id))
            .send()
            .await?;
        unwrap_value(resp).await?;
        Ok(())
    }

    async fn command(
        &self,
        method: reqwest::Method,
        endpoint: &str,
        body: Option<Value>,
    ) -> E2eResult<Value> {
        let url = format!(
            "{}/session/{}/{}",
            self.webdriver_url, self.session_id, endpoint
        );
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        unwrap_value(req.send().await?).await
    }
}

/// Extract `value` from a WebDriver response, mapping protocol errors
async fn unwrap_value(resp: reqwest::Response) -> E2eResult<Value> {
    let status = resp.status();
    let body: Value = resp.json().await.unwrap_or(Value::Null);
    let value = body.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        let error = value.get("error").and_then(Value::as_str).unwrap_or("unknown error");
        let message = value.get("message").and_then(Value::as_str).unwrap_or("");
        return Err(E2eError::WebDriver(format!("{} ({}): {}", error, status, message)));
    }

    Ok(value)
}
