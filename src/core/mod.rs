pub mod config;
pub mod error;
pub mod types;

pub use config::ScraperConfig;
pub use error::MusterError;
