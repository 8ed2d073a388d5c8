//! `PageAutomation` over a real Chromium via `chromiumoxide`.
//!
//! Element operations are short scripts evaluated in the focused window; each
//! one locates its element afresh, so no element handle outlives a call.
//! When a frame has been entered the scripts run against that frame's
//! `contentDocument` (the portal's search iframe is same-origin).

use async_trait::async_trait;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::layout::Point;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::config::BrowserSettings;
use crate::core::error::{MusterError, Result};
use crate::core::types::WindowHandle;
use crate::scraping::automation::{Locator, OptionChoice, PageAutomation, WindowControl};
use crate::scraping::browser_manager;

/// One headless browser process and the window we are driving in it.
pub struct ChromiumSession {
    browser: Option<Browser>,
    handler_task: Option<JoinHandle<()>>,
    page: Option<Page>,
    frame: Option<Locator>,
    poll_interval: Duration,
}

impl ChromiumSession {
    /// Launch a browser per `settings` and open one blank window.
    pub async fn open(settings: &BrowserSettings, poll_interval: Duration) -> Result<Self> {
        let exe = browser_manager::resolve_executable(settings).ok_or_else(|| {
            MusterError::BrowserLaunch(
                "No browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE."
                    .to_string(),
            )
        })?;
        info!("🚀 Launching browser ({})", exe);

        let config = browser_manager::build_launch_config(&exe, settings)
            .map_err(|e| MusterError::BrowserLaunch(e.to_string()))?;
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| MusterError::BrowserLaunch(format!("{} ({})", e, exe)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                // No session object exists yet to tear this down later.
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                return Err(MusterError::BrowserLaunch(format!(
                    "failed to open a window: {}",
                    e
                )));
            }
        };

        Ok(Self {
            browser: Some(browser),
            handler_task: Some(handler_task),
            page: Some(page),
            frame: None,
            poll_interval,
        })
    }

    fn browser(&self) -> Result<&Browser> {
        self.browser
            .as_ref()
            .ok_or_else(|| MusterError::Browser("browser session already closed".to_string()))
    }

    fn page(&self) -> Result<&Page> {
        self.page
            .as_ref()
            .ok_or_else(|| MusterError::Browser("no window is focused".to_string()))
    }

    async fn pages(&self) -> Result<Vec<Page>> {
        self.browser()?.pages().await.map_err(cdp_error)
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T> {
        let page = self.page()?;
        let mut params = EvaluateParams::new(script);
        params.return_by_value = Some(true);
        // Lets script clicks open popups the way a real click would.
        params.user_gesture = Some(true);
        let result = page.evaluate_expression(params).await.map_err(cdp_error)?;
        result
            .into_value::<T>()
            .map_err(|e| MusterError::Browser(format!("unexpected script result: {:?}", e)))
    }

    /// Run `body` with `doc` bound to the current document (or entered frame).
    async fn eval_scoped(&self, body: &str) -> Result<Reply> {
        self.eval(scoped_script(self.frame.as_ref(), body)).await
    }

    async fn element_op(&self, locator: &Locator, action: &str) -> Result<Reply> {
        let body = format!(
            "const el = {find}; if (!el) return {{ status: 'missing' }}; {action}",
            find = find_one(locator),
            action = action,
        );
        let reply = self.eval_scoped(&body).await?;
        match reply.status.as_str() {
            "missing" => Err(MusterError::ElementNotFound(locator.to_string())),
            "stale" => Err(MusterError::StaleReference(locator.to_string())),
            _ => Ok(reply),
        }
    }
}

#[async_trait]
impl WindowControl for ChromiumSession {
    async fn window_handles(&mut self) -> Result<Vec<WindowHandle>> {
        Ok(self.pages().await?.iter().map(handle_of).collect())
    }

    fn current_window(&self) -> Option<WindowHandle> {
        self.page.as_ref().map(handle_of)
    }

    async fn switch_to_window(&mut self, handle: &WindowHandle) -> Result<()> {
        let page = self
            .pages()
            .await?
            .into_iter()
            .find(|p| handle_of(p) == *handle)
            .ok_or_else(|| MusterError::Browser(format!("no window with handle {}", handle)))?;
        page.bring_to_front().await.map_err(cdp_error)?;
        self.page = Some(page);
        self.frame = None;
        Ok(())
    }

    async fn close_window(&mut self) -> Result<()> {
        self.frame = None;
        if let Some(page) = self.page.take() {
            page.close().await.map_err(cdp_error)?;
        }
        Ok(())
    }
}

#[async_trait]
impl PageAutomation for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        info!("🌐 Navigating to: {}", url);
        self.frame = None;
        self.page()?.goto(url).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn wait_for(&mut self, locator: &Locator, timeout: Duration) -> Result<()> {
        let start = Instant::now();
        let script = format!(
            "return {{ status: ({}) ? 'ok' : 'missing' }};",
            find_one(locator)
        );
        loop {
            // Errors here are documents mid-navigation; keep polling.
            match self.eval_scoped(&script).await {
                Ok(reply) if reply.status == "ok" => return Ok(()),
                Ok(_) => {}
                Err(e) => debug!("wait_for {}: {}", locator, e),
            }
            if start.elapsed() >= timeout {
                return Err(MusterError::timeout(locator.to_string(), timeout));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn click(&mut self, locator: &Locator) -> Result<()> {
        let reply = self
            .element_op(
                locator,
                "el.scrollIntoView({ block: 'center', inline: 'center' }); \
                 const r = el.getBoundingClientRect(); \
                 let x = r.left + r.width / 2, y = r.top + r.height / 2; \
                 const host = doc.defaultView ? doc.defaultView.frameElement : null; \
                 if (host) { const fr = host.getBoundingClientRect(); \
                   x += fr.left + host.clientLeft; y += fr.top + host.clientTop; } \
                 return { status: 'ok', value: [x, y] };",
            )
            .await?;
        let (x, y): (f64, f64) = serde_json::from_value(reply.value)
            .map_err(|e| MusterError::Browser(format!("bad click coordinates: {}", e)))?;
        self.page()?
            .click(Point { x, y })
            .await
            .map_err(cdp_error)?;
        Ok(())
    }

    async fn script_click(&mut self, locator: &Locator) -> Result<()> {
        self.element_op(locator, "el.click(); return { status: 'ok' };")
            .await?;
        Ok(())
    }

    async fn read_text(&mut self, locator: &Locator) -> Result<String> {
        let reply = self
            .element_op(
                locator,
                &format!("return {{ status: 'ok', value: {}(el) }};", TEXT_OF),
            )
            .await?;
        Ok(reply.value.as_str().unwrap_or_default().to_string())
    }

    async fn read_texts(&mut self, locator: &Locator) -> Result<Vec<String>> {
        let body = format!(
            "return {{ status: 'ok', value: ({}).map({}) }};",
            find_all(locator),
            TEXT_OF
        );
        let reply = self.eval_scoped(&body).await?;
        if reply.status == "stale" {
            return Err(MusterError::StaleReference(locator.to_string()));
        }
        serde_json::from_value(reply.value)
            .map_err(|e| MusterError::Browser(format!("bad text list for {}: {}", locator, e)))
    }

    async fn enter_text(&mut self, locator: &Locator, value: &str) -> Result<()> {
        self.element_op(
            locator,
            &format!("el.value = {}; return {{ status: 'ok' }};", js_string(value)),
        )
        .await?;
        Ok(())
    }

    async fn select_option(&mut self, locator: &Locator, choice: &OptionChoice) -> Result<()> {
        let matcher = match choice {
            OptionChoice::VisibleText(t) => {
                format!("(o) => (o.text || '').trim() === {}", js_string(t.trim()))
            }
            OptionChoice::Value(v) => format!("(o) => o.value === {}", js_string(v)),
        };
        let body = format!(
            "const el = {find}; \
             if (!el || !el.isConnected) return {{ status: 'stale' }}; \
             const opts = Array.from(el.options || []); \
             const idx = opts.findIndex({matcher}); \
             if (idx < 0) return {{ status: 'no_option', value: opts.map((o) => (o.text || '').trim()) }}; \
             if (el.selectedIndex !== idx) {{ \
               el.selectedIndex = idx; \
               el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
               el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             }} \
             return {{ status: 'ok' }};",
            find = find_one(locator),
            matcher = matcher,
        );
        let reply = self.eval_scoped(&body).await?;
        match reply.status.as_str() {
            "ok" => Ok(()),
            // The control vanished between the wait and this call: re-rendered.
            "stale" => Err(MusterError::StaleReference(locator.to_string())),
            _ => Err(MusterError::ElementNotFound(format!(
                "option '{}' in {} (available: {})",
                choice.as_str(),
                locator,
                reply.value
            ))),
        }
    }

    async fn enter_frame(&mut self, locator: &Locator) -> Result<()> {
        // Frames are always resolved from the top document.
        let body = format!(
            "const f = {}; if (!f) return {{ status: 'missing' }}; \
             let inner = null; try {{ inner = f.contentDocument; }} catch (e) {{}} \
             return {{ status: inner ? 'ok' : 'stale' }};",
            find_one(locator)
        );
        let reply: Reply = self.eval(scoped_script(None, &body)).await?;
        match reply.status.as_str() {
            "ok" => {
                self.frame = Some(locator.clone());
                Ok(())
            }
            "missing" => Err(MusterError::ElementNotFound(locator.to_string())),
            _ => Err(MusterError::StaleReference(format!(
                "frame {} has no accessible document",
                locator
            ))),
        }
    }

    async fn go_back(&mut self) -> Result<()> {
        self.frame = None;
        let _: Reply = self
            .eval(scoped_script(
                None,
                "window.history.back(); return { status: 'ok' };",
            ))
            .await?;
        Ok(())
    }

    async fn page_html(&mut self) -> Result<String> {
        if self.frame.is_none() {
            return self.page()?.content().await.map_err(cdp_error);
        }
        let reply = self
            .eval_scoped("return { status: 'ok', value: doc.documentElement.outerHTML };")
            .await?;
        reply
            .value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| MusterError::StaleReference("frame document".to_string()))
    }

    async fn quit(&mut self) -> Result<()> {
        self.page = None;
        self.frame = None;
        let mut outcome = Ok(());
        if let Some(mut browser) = self.browser.take() {
            info!("🛑 Closing browser session");
            if let Err(e) = browser.close().await {
                outcome = Err(MusterError::Browser(format!("browser close failed: {}", e)));
            }
            if let Err(e) = browser.wait().await {
                warn!("Browser process wait failed: {}", e);
            }
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        outcome
    }
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        // Only reached without quit() on panics; never leave Chromium behind.
        let Some(mut browser) = self.browser.take() else {
            return;
        };
        let task = self.handler_task.take();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("ChromiumSession dropped outside a runtime; browser process may linger");
            return;
        };
        handle.spawn(async move {
            let _ = browser.close().await;
            let _ = browser.wait().await;
            if let Some(task) = task {
                task.abort();
            }
        });
    }
}

/// Status envelope every injected script returns.
#[derive(Debug, Deserialize)]
struct Reply {
    status: String,
    #[serde(default)]
    value: serde_json::Value,
}

/// Visible text of an element, trimmed.
const TEXT_OF: &str =
    "((n) => ((n.innerText !== undefined ? n.innerText : n.textContent) || '').trim())";

fn handle_of(page: &Page) -> WindowHandle {
    WindowHandle::new(page.target_id().inner().clone())
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Expression yielding the document element operations run against.
fn document_root(frame: Option<&Locator>) -> String {
    match frame {
        None => "document".to_string(),
        Some(loc) => format!(
            "(() => {{ const doc = document; const f = {}; \
             try {{ return f ? f.contentDocument : null; }} catch (e) {{ return null; }} }})()",
            find_one(loc)
        ),
    }
}

fn scoped_script(frame: Option<&Locator>, body: &str) -> String {
    format!(
        "(() => {{ const doc = {}; if (!doc) return {{ status: 'stale' }}; {} }})()",
        document_root(frame),
        body
    )
}

/// Expression yielding the first element matching `locator` in `doc`, or null.
fn find_one(locator: &Locator) -> String {
    match locator {
        Locator::Id(id) => format!("doc.getElementById({})", js_string(id)),
        // 9 = XPathResult.FIRST_ORDERED_NODE_TYPE
        Locator::XPath(x) => format!(
            "doc.evaluate({}, doc, null, 9, null).singleNodeValue",
            js_string(x)
        ),
        Locator::PartialLinkText(t) => format!(
            "(Array.from(doc.querySelectorAll('a')).find((a) => {}(a).includes({})) || null)",
            TEXT_OF,
            js_string(t)
        ),
    }
}

/// Expression yielding every element matching `locator` in `doc`, as an array.
fn find_all(locator: &Locator) -> String {
    match locator {
        Locator::Id(id) => format!("[doc.getElementById({})].filter(Boolean)", js_string(id)),
        // 7 = XPathResult.ORDERED_NODE_SNAPSHOT_TYPE
        Locator::XPath(x) => format!(
            "((r) => Array.from({{ length: r.snapshotLength }}, (_, i) => r.snapshotItem(i)))\
             (doc.evaluate({}, doc, null, 7, null))",
            js_string(x)
        ),
        Locator::PartialLinkText(t) => format!(
            "Array.from(doc.querySelectorAll('a')).filter((a) => {}(a).includes({}))",
            TEXT_OF,
            js_string(t)
        ),
    }
}

const STALE_SIGNATURES: &[&str] = &[
    "cannot find context with specified id",
    "execution context was destroyed",
    "inspected target navigated or closed",
    "no node with given id",
    "could not find node with given id",
];

fn cdp_error(e: CdpError) -> MusterError {
    let msg = e.to_string();
    let lower = msg.to_ascii_lowercase();
    if STALE_SIGNATURES.iter().any(|sig| lower.contains(sig)) {
        MusterError::StaleReference(msg)
    } else {
        MusterError::Browser(msg)
    }
}
