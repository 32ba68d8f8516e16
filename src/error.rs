use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parser configuration: {0}")]
    ConfigParse(String),

    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Unsupported venue class: {0}")]
    UnsupportedClass(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("External binary failed: {0}")]
    ExternalBinary(String),
}

pub type Result<T> = std::result::Result<T, ScraperError>;
