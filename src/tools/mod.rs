pub mod aggregate;
pub mod export;
pub mod extract;
pub mod muster;
pub mod navigation;

pub use aggregate::RecordAggregator;
pub use extract::{HtmlSnapshot, TableExtractor, TableSource};
pub use muster::{run_mnrega_scraper, run_with_driver};
pub use navigation::{FlowState, NavigationFlow};
