pub mod automation;
pub mod browser_manager;
pub mod chromium;
pub mod retry;
pub mod windows;

pub use automation::{Locator, OptionChoice, PageAutomation, WindowControl};
pub use chromium::ChromiumSession;
pub use retry::{RetryPolicy, RetryingSelector};
pub use windows::WindowManager;
