pub mod core;
pub mod scraping;
pub mod setup;
pub mod tools;

// --- Primary exports ---
pub use core::error::{MusterError, Result};
pub use core::types;
pub use core::types::*;
pub use core::ScraperConfig;

pub use scraping::{Locator, OptionChoice, PageAutomation, WindowControl};
pub use tools::{run_mnrega_scraper, run_with_driver};
