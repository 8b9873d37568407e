//! Chromium lifecycle and the production [`Page`] implementation.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::cdp::{CdpClient, CdpEvent};
use crate::error::{DriverError, DriverResult};
use crate::page::{DownloadEvent, Page, ValueOption, WaitState};

const BINARY_ENV: &str = "ESCOLAS_CHROMIUM";
const BINARY_CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome-stable",
    "google-chrome",
    "chrome",
];
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(15);
const POLL_INTERVAL: Duration = Duration::from_millis(150);

/// Session launch parameters.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Directory the browser delivers exports into.
    pub download_dir: PathBuf,
    /// Explicit browser binary; otherwise `ESCOLAS_CHROMIUM` and then a
    /// PATH search over the usual names.
    pub binary: Option<PathBuf>,
    pub window_size: (u32, u32),
    pub locale: String,
    /// Ceiling for any single protocol command.
    pub command_timeout: Duration,
}

impl LaunchOptions {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            headless: true,
            download_dir: download_dir.into(),
            binary: None,
            window_size: (1920, 1080),
            locale: "pt-BR".to_string(),
            command_timeout: Duration::from_secs(120),
        }
    }
}

/// One Chromium process, one attached page, one DevTools connection.
pub struct ChromiumSession {
    client: CdpClient,
    session_id: String,
    child: Option<Child>,
    profile: Option<TempDir>,
    download_dir: PathBuf,
    armed: Mutex<Option<broadcast::Receiver<CdpEvent>>>,
}

impl ChromiumSession {
    pub async fn launch(options: LaunchOptions) -> DriverResult<Self> {
        let binary = resolve_binary(options.binary.as_deref())?;
        let profile = tempfile::Builder::new()
            .prefix("escolas-profile-")
            .tempdir()?;

        std::fs::create_dir_all(&options.download_dir)?;
        let download_dir = options.download_dir.canonicalize()?;

        let mut command = Command::new(&binary);
        command
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile.path().display()))
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--lang={}", options.locale))
            .arg(format!(
                "--window-size={},{}",
                options.window_size.0, options.window_size.1
            ));
        if options.headless {
            command.arg("--headless=new");
        }
        command
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        info!(binary = %binary.display(), headless = options.headless, "chromium spawned");

        let ws_url = match discover_endpoint_from_stderr(&mut child).await {
            Ok(url) => url,
            Err(error) => {
                debug!(%error, "stderr handshake failed, falling back to DevToolsActivePort");
                discover_endpoint_from_profile(profile.path()).await?
            }
        };
        debug!(%ws_url, "DevTools endpoint discovered");

        let client = CdpClient::connect(&ws_url, options.command_timeout).await?;

        let created = client
            .call(None, "Target.createTarget", json!({ "url": "about:blank" }))
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol {
                method: "Target.createTarget".to_string(),
                message: "response carried no targetId".to_string(),
            })?
            .to_string();

        let attached = client
            .call(
                None,
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
            )
            .await?;
        let session_id = attached
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol {
                method: "Target.attachToTarget".to_string(),
                message: "response carried no sessionId".to_string(),
            })?
            .to_string();

        client.call(Some(&session_id), "Page.enable", json!({})).await?;
        client
            .call(Some(&session_id), "Runtime.enable", json!({}))
            .await?;
        client
            .call(
                None,
                "Browser.setDownloadBehavior",
                json!({
                    "behavior": "allowAndName",
                    "downloadPath": download_dir.display().to_string(),
                    "eventsEnabled": true,
                }),
            )
            .await?;

        Ok(Self {
            client,
            session_id,
            child: Some(child),
            profile: Some(profile),
            download_dir,
            armed: Mutex::new(None),
        })
    }

    /// Release the session. With `keep_open` the browser is intentionally
    /// left running (and the profile kept) for manual inspection; release
    /// then becomes the operator's responsibility.
    pub async fn close(mut self, keep_open: bool) -> DriverResult<()> {
        self.client.shutdown();
        if keep_open {
            if let Some(profile) = self.profile.take() {
                let path = profile.keep();
                info!(profile = %path.display(), "session left open for inspection");
            }
            if let Some(child) = self.child.take() {
                std::mem::forget(child);
            }
            return Ok(());
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = tokio::time::timeout(Duration::from_secs(5), child.wait()).await;
        }
        Ok(())
    }

    async fn eval_in_page(&self, expression: &str) -> DriverResult<Value> {
        let result = self
            .client
            .call(
                Some(&self.session_id),
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        if let Some(exception) = result.get("exceptionDetails") {
            let message = exception
                .pointer("/exception/description")
                .and_then(Value::as_str)
                .or_else(|| exception.get("text").and_then(Value::as_str))
                .unwrap_or("unknown evaluation error");
            return Err(DriverError::Evaluate(message.to_string()));
        }
        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn eval_bool(&self, expression: &str) -> DriverResult<bool> {
        Ok(self
            .eval_in_page(expression)
            .await?
            .as_bool()
            .unwrap_or(false))
    }
}

#[async_trait]
impl Page for ChromiumSession {
    async fn goto(&self, url: &str, timeout: Duration) -> DriverResult<()> {
        // Subscribe before navigating so the load event cannot be missed.
        let mut events = self.client.subscribe();
        self.client
            .call(Some(&self.session_id), "Page.navigate", json!({ "url": url }))
            .await?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let event = match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Ok(event)) => event,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(_)) => return Err(DriverError::Closed),
                Err(_) => return Err(DriverError::NavigationTimeout(timeout)),
            };
            if event.method == "Page.loadEventFired"
                && event.session_id.as_deref() == Some(&self.session_id)
            {
                return Ok(());
            }
        }
    }

    async fn wait_for(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> DriverResult<bool> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let satisfied = match state {
                WaitState::Attached => self.exists(selector).await?,
                WaitState::Visible => self.is_visible(selector).await?,
                WaitState::Hidden => !self.is_visible(selector).await?,
            };
            if satisfied {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn query_attribute_all(
        &self,
        selector: &str,
        attribute: &str,
    ) -> DriverResult<Vec<String>> {
        let expression = format!(
            "Array.from(document.querySelectorAll({sel})).map(el => el.getAttribute({attr})).filter(v => v !== null)",
            sel = js_str(selector),
            attr = js_str(attribute),
        );
        let value = self.eval_in_page(&expression).await?;
        serde_json::from_value(value).map_err(|e| DriverError::Evaluate(e.to_string()))
    }

    async fn exists(&self, selector: &str) -> DriverResult<bool> {
        self.eval_bool(&format!(
            "!!document.querySelector({})",
            js_str(selector)
        ))
        .await
    }

    async fn is_visible(&self, selector: &str) -> DriverResult<bool> {
        self.eval_bool(&format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; \
             const r = el.getBoundingClientRect(); const st = window.getComputedStyle(el); \
             return r.width > 0 && r.height > 0 && st.visibility !== 'hidden' && st.display !== 'none'; }})()",
            js_str(selector)
        ))
        .await
    }

    async fn is_enabled(&self, selector: &str) -> DriverResult<bool> {
        self.eval_bool(&format!(
            "(() => {{ const el = document.querySelector({}); \
             return !!el && !el.disabled && el.getAttribute('aria-disabled') !== 'true'; }})()",
            js_str(selector)
        ))
        .await
    }

    async fn input_value(&self, selector: &str) -> DriverResult<Option<String>> {
        let value = self
            .eval_in_page(&format!(
                "(() => {{ const el = document.querySelector({}); if (!el) return null; \
                 return el.value !== undefined ? String(el.value) : (el.textContent || ''); }})()",
                js_str(selector)
            ))
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn clear_input(&self, selector: &str) -> DriverResult<()> {
        self.eval_in_page(&format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; \
             el.value = ''; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return true; }})()",
            js_str(selector)
        ))
        .await?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> DriverResult<bool> {
        self.eval_bool(&format!(
            "(() => {{ for (const el of document.querySelectorAll({})) {{ \
             const r = el.getBoundingClientRect(); if (r.width === 0 || r.height === 0) continue; \
             el.scrollIntoView({{ block: 'center' }}); el.click(); return true; }} return false; }})()",
            js_str(selector)
        ))
        .await
    }

    async fn click_at(&self, x: f64, y: f64) -> DriverResult<()> {
        for kind in ["mousePressed", "mouseReleased"] {
            self.client
                .call(
                    Some(&self.session_id),
                    "Input.dispatchMouseEvent",
                    json!({
                        "type": kind,
                        "x": x,
                        "y": y,
                        "button": "left",
                        "clickCount": 1,
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn click_text(&self, tags: &[&str], text: &str, exact: bool) -> DriverResult<bool> {
        let selector = tags.join(", ");
        let matcher = if exact {
            "t === needle"
        } else {
            "t.includes(needle)"
        };
        self.eval_bool(&format!(
            "(() => {{ const needle = {needle}; \
             for (const el of document.querySelectorAll({sel})) {{ \
             const t = (el.textContent || el.value || '').trim(); \
             if (!({matcher})) continue; \
             const r = el.getBoundingClientRect(); if (r.width === 0 || r.height === 0) continue; \
             el.scrollIntoView({{ block: 'center' }}); el.click(); return true; }} return false; }})()",
            needle = js_str(text),
            sel = js_str(&selector),
        ))
        .await
    }

    async fn body_text(&self) -> DriverResult<String> {
        let value = self
            .eval_in_page("document.body ? document.body.innerText : ''")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn list_options(&self, list_selector: &str) -> DriverResult<Vec<ValueOption>> {
        let expression = format!(
            "(() => {{ const root = document.querySelector({}); if (!root) return []; \
             return Array.from(root.querySelectorAll(\"input[type='checkbox']\")).map((el, index) => {{ \
             let text = ''; \
             const label = el.closest('label') || (el.id ? document.querySelector('label[for=\"' + el.id + '\"]') : null); \
             if (label) text = label.textContent || ''; \
             if (!text) {{ const row = el.closest('td, tr, span, div'); if (row) text = row.textContent || ''; }} \
             return {{ index, id: el.id || '', value: el.getAttribute('value') || '', \
                       text: text.trim(), checked: !!el.checked }}; }}); }})()",
            js_str(list_selector)
        );
        let value = self.eval_in_page(&expression).await?;
        serde_json::from_value(value).map_err(|e| DriverError::Evaluate(e.to_string()))
    }

    async fn toggle_option(&self, list_selector: &str, index: usize) -> DriverResult<bool> {
        self.eval_bool(&format!(
            "(() => {{ const root = document.querySelector({sel}); if (!root) return false; \
             const boxes = root.querySelectorAll(\"input[type='checkbox']\"); \
             const el = boxes[{index}]; if (!el) return false; el.click(); return !!el.checked; }})()",
            sel = js_str(list_selector),
            index = index,
        ))
        .await
    }

    async fn eval(&self, expression: &str) -> DriverResult<Value> {
        self.eval_in_page(expression).await
    }

    async fn arm_download(&self) -> DriverResult<()> {
        if let Ok(mut slot) = self.armed.lock() {
            *slot = Some(self.client.subscribe());
        }
        Ok(())
    }

    async fn wait_for_download(&self, timeout: Duration) -> DriverResult<DownloadEvent> {
        let mut events = self
            .armed
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
            .ok_or_else(|| DriverError::Protocol {
                method: "wait_for_download".to_string(),
                message: "download listener was not armed".to_string(),
            })?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let event = match tokio::time::timeout_at(deadline, events.recv()).await {
                Ok(Ok(event)) => event,
                Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
                Ok(Err(_)) => return Err(DriverError::Closed),
                Err(_) => return Err(DriverError::DownloadTimeout(timeout)),
            };
            match event.method.as_str() {
                "Browser.downloadWillBegin" => {
                    trace!(
                        file = event
                            .params
                            .get("suggestedFilename")
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or("?"),
                        "download starting"
                    );
                }
                "Browser.downloadProgress" => {
                    let state = event.params.get("state").and_then(Value::as_str);
                    if state == Some("completed") {
                        let guid = event
                            .params
                            .get("guid")
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        let path = self.download_dir.join(guid);
                        let bytes = match tokio::fs::metadata(&path).await {
                            Ok(meta) => meta.len(),
                            Err(_) => event
                                .params
                                .get("receivedBytes")
                                .and_then(Value::as_u64)
                                .unwrap_or(0),
                        };
                        return Ok(DownloadEvent { path, bytes });
                    }
                    if state == Some("canceled") {
                        return Err(DriverError::Protocol {
                            method: "Browser.downloadProgress".to_string(),
                            message: "download was canceled by the browser".to_string(),
                        });
                    }
                }
                _ => {}
            }
        }
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        let result = self
            .client
            .call(
                Some(&self.session_id),
                "Page.captureScreenshot",
                json!({ "format": "png" }),
            )
            .await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| DriverError::Protocol {
                method: "Page.captureScreenshot".to_string(),
                message: "response carried no image data".to_string(),
            })?;
        let bytes = BASE64
            .decode(data)
            .map_err(|e| DriverError::Evaluate(e.to_string()))?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

fn resolve_binary(explicit: Option<&Path>) -> DriverResult<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Ok(path) = std::env::var(BINARY_ENV)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }
    for candidate in BINARY_CANDIDATES {
        if let Ok(path) = which::which(candidate) {
            return Ok(path);
        }
    }
    Err(DriverError::BinaryNotFound)
}

/// Chromium prints `DevTools listening on ws://...` to stderr once the
/// debugging server is up.
async fn discover_endpoint_from_stderr(child: &mut Child) -> DriverResult<String> {
    let stderr = child.stderr.take().ok_or_else(|| DriverError::Protocol {
        method: "launch".to_string(),
        message: "browser stderr was not captured".to_string(),
    })?;
    let mut lines = BufReader::new(stderr).lines();

    let found = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(rest) = line.strip_prefix("DevTools listening on ") {
                return Some(rest.trim().to_string());
            }
        }
        None
    })
    .await
    .map_err(|_| DriverError::HandshakeTimeout(HANDSHAKE_TIMEOUT))?
    .ok_or(DriverError::HandshakeTimeout(HANDSHAKE_TIMEOUT))?;

    // Keep draining stderr so the child never blocks on a full pipe.
    tokio::spawn(async move {
        while let Ok(Some(line)) = lines.next_line().await {
            trace!(target: "escolas_driver::chromium_stderr", "{line}");
        }
    });

    Ok(found)
}

/// Fallback discovery: chromium writes `DevToolsActivePort` into the profile
/// directory; the browser websocket URL then comes from `/json/version`.
async fn discover_endpoint_from_profile(profile: &Path) -> DriverResult<String> {
    let marker = profile.join("DevToolsActivePort");
    let deadline = tokio::time::Instant::now() + HANDSHAKE_TIMEOUT;
    loop {
        if let Ok(contents) = tokio::fs::read_to_string(&marker).await
            && let Some(port) = contents.lines().next().and_then(|l| l.trim().parse::<u16>().ok())
        {
            let version: Value = reqwest::get(format!("http://127.0.0.1:{port}/json/version"))
                .await?
                .json()
                .await?;
            if let Some(url) = version.get("webSocketDebuggerUrl").and_then(Value::as_str) {
                return Ok(url.to_string());
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(DriverError::HandshakeTimeout(HANDSHAKE_TIMEOUT));
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

/// Escape a string into a JavaScript double-quoted literal.
fn js_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
