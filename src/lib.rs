pub mod config;
pub mod cycle;
pub mod evaluator;
pub mod extractor;
pub mod fetcher;
pub mod models;
pub mod notifier;
pub mod scheduler;
pub mod store;
pub mod utils;

// Re-export commonly used types
pub use config::AppConfig;
pub use utils::error::{AppError, ScrapeError};

pub type Result<T> = std::result::Result<T, AppError>;
