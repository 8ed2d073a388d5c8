//! Scripted stand-in for the MGNREGA portal, driven through `PageAutomation`.
//!
//! Every wait resolves immediately against the scripted page state, so flows
//! run without a browser or network and fail fast when a page is wrong.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use mnrega_muster::core::config::FlowTimings;
use mnrega_muster::tools::extract::TableExtractor;
use mnrega_muster::tools::navigation::{
    muster_link, summary_cell_xpath, summary_links, CATEGORY_SELECT_ID, HOME_SEARCH_URL,
    KEYWORD_INPUT_ID, REGION_SELECT_ID, SEARCH_FRAME_XPATH, SUBMIT_BUTTON_ID, SUBREGION_SELECT_ID,
};
use mnrega_muster::{Locator, MusterError, OptionChoice, PageAutomation, Result, WindowControl, WindowHandle};

pub fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Timings that keep every scripted run well under a second.
pub fn fast_timings() -> FlowTimings {
    FlowTimings {
        wait_timeout_ms: 20,
        window_timeout_ms: 20,
        extract_timeout_ms: 20,
        settle_delay_ms: 0,
        popup_grace_ms: 0,
        select_attempts: 5,
        select_retry_delay_ms: 1,
        poll_interval_ms: 1,
    }
}

/// Detail page whose table has the given header and rows.
pub fn detail_page(header: &[&str], rows: &[&[&str]]) -> String {
    let head: String = header.iter().map(|h| format!("<th>{}</th>", h)).collect();
    let body: String = rows
        .iter()
        .map(|r| {
            let cells: String = r.iter().map(|c| format!("<td>{}</td>", c)).collect();
            format!("<tr>{}</tr>", cells)
        })
        .collect();
    format!(
        "<html><body><h3>Mustroll Detail</h3><div><table><tr>{}</tr>{}</table></div></body></html>",
        head, body
    )
}

/// A detail page that rendered something other than a muster roll.
pub fn broken_page() -> String {
    "<html><body><p>Service unavailable</p></body></html>".to_string()
}

#[derive(Debug, Clone)]
pub struct RollPage {
    pub label: String,
    pub html: String,
    /// Opens in a new window rather than replacing the asset register.
    pub opens_window: bool,
}

#[derive(Debug, Clone, PartialEq)]
enum Page {
    Blank,
    Home,
    Results,
    AssetRegister,
    Detail(String),
}

#[derive(Debug)]
struct Window {
    handle: WindowHandle,
    page: Page,
    history: Vec<Page>,
}

pub struct FakePortal {
    work_code: String,
    rolls: Vec<RollPage>,
    results_in_new_window: bool,
    lists_work: bool,
    stale_left: HashMap<String, u32>,
    windows: Vec<Window>,
    focused: Option<WindowHandle>,
    in_frame: bool,
    next_window: u32,
    /// Everything the flow did, in order.
    pub events: Vec<String>,
    /// `select_option` calls per control id, stale ones included.
    pub select_calls: HashMap<String, u32>,
    pub quit_called: bool,
}

impl FakePortal {
    pub fn new(work_code: &str) -> Self {
        let home = WindowHandle::new("w0");
        Self {
            work_code: work_code.to_string(),
            rolls: Vec::new(),
            results_in_new_window: true,
            lists_work: true,
            stale_left: HashMap::new(),
            windows: vec![Window {
                handle: home.clone(),
                page: Page::Blank,
                history: Vec::new(),
            }],
            focused: Some(home),
            in_frame: false,
            next_window: 1,
            events: Vec::new(),
            select_calls: HashMap::new(),
            quit_called: false,
        }
    }

    pub fn with_popup_roll(mut self, label: &str, html: String) -> Self {
        self.rolls.push(RollPage {
            label: label.to_string(),
            html,
            opens_window: true,
        });
        self
    }

    pub fn with_inline_roll(mut self, label: &str, html: String) -> Self {
        self.rolls.push(RollPage {
            label: label.to_string(),
            html,
            opens_window: false,
        });
        self
    }

    /// `select_option` on `control_id` reports a stale element `times` times.
    pub fn stale_select(mut self, control_id: &str, times: u32) -> Self {
        self.stale_left.insert(control_id.to_string(), times);
        self
    }

    /// Search results replace the home page instead of opening a window.
    pub fn results_in_place(mut self) -> Self {
        self.results_in_new_window = false;
        self
    }

    /// The results page lists no link for the searched work code.
    pub fn without_matching_work(mut self) -> Self {
        self.lists_work = false;
        self
    }

    pub fn open_window_count(&self) -> usize {
        self.windows.len()
    }

    fn log(&mut self, event: impl Into<String>) {
        self.events.push(event.into());
    }

    fn focused_window(&mut self) -> Result<&mut Window> {
        let handle = self
            .focused
            .clone()
            .ok_or_else(|| MusterError::Browser("no window is focused".to_string()))?;
        self.windows
            .iter_mut()
            .find(|w| w.handle == handle)
            .ok_or_else(|| MusterError::Browser(format!("window {} is gone", handle)))
    }

    fn page(&self) -> Page {
        self.focused
            .as_ref()
            .and_then(|h| self.windows.iter().find(|w| &w.handle == h))
            .map(|w| w.page.clone())
            .unwrap_or(Page::Blank)
    }

    fn roll(&self, label: &str) -> Option<&RollPage> {
        self.rolls.iter().find(|r| r.label == label)
    }

    fn form_control(locator: &Locator) -> bool {
        [
            CATEGORY_SELECT_ID,
            REGION_SELECT_ID,
            SUBREGION_SELECT_ID,
            KEYWORD_INPUT_ID,
            SUBMIT_BUTTON_ID,
        ]
        .iter()
        .any(|id| *locator == Locator::id(*id))
    }

    fn present(&self, locator: &Locator) -> bool {
        let page = self.page();
        if *locator == Locator::xpath(SEARCH_FRAME_XPATH) {
            return page == Page::Home && !self.in_frame;
        }
        if Self::form_control(locator) {
            return page == Page::Home && self.in_frame;
        }
        if let Locator::PartialLinkText(text) = locator {
            return page == Page::Results && self.lists_work && self.work_code.contains(text.as_str());
        }
        if *locator == Locator::xpath(summary_cell_xpath()) || *locator == summary_links() {
            return page == Page::AssetRegister;
        }
        if *locator == TableExtractor::anchor_locator() {
            return match &page {
                Page::Detail(label) => self
                    .roll(label)
                    .is_some_and(|r| r.html.contains("Mustroll Detail")),
                _ => false,
            };
        }
        page == Page::AssetRegister && self.rolls.iter().any(|r| *locator == muster_link(&r.label))
    }

    fn open_window(&mut self, page: Page) -> WindowHandle {
        let handle = WindowHandle::new(format!("w{}", self.next_window));
        self.next_window += 1;
        self.windows.push(Window {
            handle: handle.clone(),
            page,
            history: Vec::new(),
        });
        self.log(format!("open {}", handle));
        handle
    }

    fn replace_page(&mut self, page: Page) -> Result<()> {
        let window = self.focused_window()?;
        let prior = std::mem::replace(&mut window.page, page);
        window.history.push(prior);
        Ok(())
    }
}

#[async_trait]
impl WindowControl for FakePortal {
    async fn window_handles(&mut self) -> Result<Vec<WindowHandle>> {
        Ok(self.windows.iter().map(|w| w.handle.clone()).collect())
    }

    fn current_window(&self) -> Option<WindowHandle> {
        self.focused.clone()
    }

    async fn switch_to_window(&mut self, handle: &WindowHandle) -> Result<()> {
        if !self.windows.iter().any(|w| &w.handle == handle) {
            return Err(MusterError::Browser(format!("no window {}", handle)));
        }
        self.log(format!("focus {}", handle));
        self.focused = Some(handle.clone());
        self.in_frame = false;
        Ok(())
    }

    async fn close_window(&mut self) -> Result<()> {
        if let Some(handle) = self.focused.take() {
            self.log(format!("close {}", handle));
            self.windows.retain(|w| w.handle != handle);
        }
        Ok(())
    }
}

#[async_trait]
impl PageAutomation for FakePortal {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.log(format!("navigate {}", url));
        self.in_frame = false;
        let page = if url == HOME_SEARCH_URL {
            Page::Home
        } else {
            Page::Blank
        };
        self.replace_page(page)
    }

    async fn wait_for(&mut self, locator: &Locator, timeout: Duration) -> Result<()> {
        if self.present(locator) {
            Ok(())
        } else {
            Err(MusterError::Timeout {
                what: locator.to_string(),
                waited: timeout,
            })
        }
    }

    async fn click(&mut self, locator: &Locator) -> Result<()> {
        if !self.present(locator) {
            return Err(MusterError::ElementNotFound(locator.to_string()));
        }
        self.log(format!("click {}", locator));
        if *locator == Locator::id(SUBMIT_BUTTON_ID) {
            if self.results_in_new_window {
                self.open_window(Page::Results);
            } else {
                self.replace_page(Page::Results)?;
            }
        }
        Ok(())
    }

    async fn script_click(&mut self, locator: &Locator) -> Result<()> {
        if !self.present(locator) {
            return Err(MusterError::ElementNotFound(locator.to_string()));
        }
        self.log(format!("script_click {}", locator));
        if let Locator::PartialLinkText(_) = locator {
            return self.replace_page(Page::AssetRegister);
        }
        let roll = self
            .rolls
            .iter()
            .find(|r| *locator == muster_link(&r.label))
            .cloned();
        match roll {
            Some(r) if r.opens_window => {
                self.open_window(Page::Detail(r.label));
                Ok(())
            }
            Some(r) => self.replace_page(Page::Detail(r.label)),
            None => Ok(()),
        }
    }

    async fn read_text(&mut self, locator: &Locator) -> Result<String> {
        Err(MusterError::ElementNotFound(locator.to_string()))
    }

    async fn read_texts(&mut self, locator: &Locator) -> Result<Vec<String>> {
        if *locator == summary_links() && self.present(locator) {
            // A blank anchor sits in the real row too.
            let mut labels: Vec<String> = self.rolls.iter().map(|r| r.label.clone()).collect();
            labels.push(" ".to_string());
            return Ok(labels);
        }
        Ok(Vec::new())
    }

    async fn enter_text(&mut self, locator: &Locator, value: &str) -> Result<()> {
        if !self.present(locator) {
            return Err(MusterError::ElementNotFound(locator.to_string()));
        }
        self.log(format!("enter {}={}", locator, value));
        Ok(())
    }

    async fn select_option(&mut self, locator: &Locator, choice: &OptionChoice) -> Result<()> {
        let Locator::Id(id) = locator else {
            return Err(MusterError::ElementNotFound(locator.to_string()));
        };
        *self.select_calls.entry(id.clone()).or_default() += 1;
        if let Some(left) = self.stale_left.get_mut(id) {
            if *left > 0 {
                *left -= 1;
                return Err(MusterError::StaleReference(locator.to_string()));
            }
        }
        self.log(format!("select {}={}", id, choice.as_str()));
        Ok(())
    }

    async fn enter_frame(&mut self, locator: &Locator) -> Result<()> {
        if !self.present(locator) {
            return Err(MusterError::ElementNotFound(locator.to_string()));
        }
        self.log("enter_frame");
        self.in_frame = true;
        Ok(())
    }

    async fn go_back(&mut self) -> Result<()> {
        self.log("back");
        self.in_frame = false;
        let window = self.focused_window()?;
        if let Some(prior) = window.history.pop() {
            window.page = prior;
        }
        Ok(())
    }

    async fn page_html(&mut self) -> Result<String> {
        match self.page() {
            Page::Detail(label) => Ok(self
                .roll(&label)
                .map(|r| r.html.clone())
                .unwrap_or_default()),
            _ => Ok("<html><body></body></html>".to_string()),
        }
    }

    async fn quit(&mut self) -> Result<()> {
        self.log("quit");
        self.quit_called = true;
        self.windows.clear();
        self.focused = None;
        Ok(())
    }
}
