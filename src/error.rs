//! Custom error types for pagewise

use thiserror::Error;

/// Main error type for pagewise operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid metadata sidecar {path}: {reason}")]
    Metadata { path: String, reason: String },

    #[error("Could not determine page count for {0}")]
    PageCount(String),

    #[error("Rasterization error: {0}")]
    Raster(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error means the provider refused the call for capacity reasons
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::RateLimited(_))
    }
}

/// Result type alias for pagewise
pub type Result<T> = std::result::Result<T, Error>;
