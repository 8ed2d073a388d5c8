//! Capability contract for one browser session.
//!
//! The workflow never talks to `chromiumoxide` directly; it drives whatever
//! implements [`PageAutomation`]. The production implementation lives in
//! `scraping::chromium`, integration tests plug in a scripted portal.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::core::error::Result;
use crate::core::types::WindowHandle;

/// How an element is found on the current document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    /// `id` attribute.
    Id(String),
    /// XPath 1.0 expression evaluated against the document root.
    XPath(String),
    /// First `<a>` whose visible text contains the given string.
    PartialLinkText(String),
}

impl Locator {
    pub fn id(id: impl Into<String>) -> Self {
        Locator::Id(id.into())
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Locator::XPath(expr.into())
    }

    pub fn partial_link_text(text: impl Into<String>) -> Self {
        Locator::PartialLinkText(text.into())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(id) => write!(f, "#{}", id),
            Locator::XPath(x) => write!(f, "xpath {}", x),
            Locator::PartialLinkText(t) => write!(f, "link containing '{}'", t),
        }
    }
}

/// Which option of a `<select>` to pick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionChoice {
    /// Option whose trimmed visible text equals the string.
    VisibleText(String),
    /// Option whose `value` attribute equals the string.
    Value(String),
}

impl OptionChoice {
    pub fn as_str(&self) -> &str {
        match self {
            OptionChoice::VisibleText(s) | OptionChoice::Value(s) => s,
        }
    }
}

/// Quote `s` as an XPath 1.0 string literal.
///
/// XPath has no escape sequences, so a string holding both quote kinds is
/// assembled with `concat()`.
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        return format!("'{}'", s);
    }
    if !s.contains('"') {
        return format!("\"{}\"", s);
    }
    let parts: Vec<String> = s
        .split('\'')
        .map(|p| format!("'{}'", p))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// Window bookkeeping of a browser session.
#[async_trait]
pub trait WindowControl: Send {
    /// Every open top-level window, in the browser's order.
    async fn window_handles(&mut self) -> Result<Vec<WindowHandle>>;
    /// Window that currently receives commands, if any is focused.
    fn current_window(&self) -> Option<WindowHandle>;
    async fn switch_to_window(&mut self, handle: &WindowHandle) -> Result<()>;
    /// Close the focused window. Nothing is focused afterwards.
    async fn close_window(&mut self) -> Result<()>;
}

/// One browser session: navigation, element interaction and teardown.
///
/// Element operations act on the focused window, inside the frame entered
/// with [`PageAutomation::enter_frame`] if any.
#[async_trait]
pub trait PageAutomation: WindowControl {
    /// Load `url` in the focused window and leave any entered frame.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Block until `locator` matches, failing with `Timeout` after `timeout`.
    async fn wait_for(&mut self, locator: &Locator, timeout: Duration) -> Result<()>;

    /// Pointer click at the element's centre.
    async fn click(&mut self, locator: &Locator) -> Result<()>;

    /// Script-level `element.click()`; works on obscured or animated links.
    async fn script_click(&mut self, locator: &Locator) -> Result<()>;

    /// Trimmed visible text of the first match.
    async fn read_text(&mut self, locator: &Locator) -> Result<String>;

    /// Trimmed visible text of every match, in document order.
    async fn read_texts(&mut self, locator: &Locator) -> Result<Vec<String>>;

    /// Assign a control's `value` directly, without keystrokes.
    async fn enter_text(&mut self, locator: &Locator, value: &str) -> Result<()>;

    /// Pick one option of a `<select>`. A single attempt: fails with
    /// `StaleReference` when the control is re-rendered underneath the call.
    async fn select_option(&mut self, locator: &Locator, choice: &OptionChoice) -> Result<()>;

    /// Scope later element operations to the document of the matched frame.
    async fn enter_frame(&mut self, locator: &Locator) -> Result<()>;

    /// Browser back navigation in the focused window.
    async fn go_back(&mut self) -> Result<()>;

    /// Serialized DOM of the current document.
    async fn page_html(&mut self) -> Result<String>;

    /// Release the browser and every OS resource behind it.
    async fn quit(&mut self) -> Result<()>;
}
