use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown tracked item: {item_id}")]
    UnknownItem { item_id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure taxonomy for a single fetch+extract pipeline.
///
/// `Network`, `StructureNotFound` and `PriceNotFound` are transient by
/// policy and retried within the attempt budget. `Parse` means the price
/// node was found but its text is not a number, so another attempt will
/// not help. `PriceUnavailable` is the terminal per-item outcome once the
/// budget is spent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Expected container not found on page")]
    StructureNotFound,

    #[error("No price node matched any selector")]
    PriceNotFound,

    #[error("Price text is not numeric: {text}")]
    Parse { text: String },

    #[error("Price unavailable after {attempts} attempts")]
    PriceUnavailable { attempts: u32 },
}

impl ScrapeError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::Network(_) | ScrapeError::StructureNotFound | ScrapeError::PriceNotFound
        )
    }
}

// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;
