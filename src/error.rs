use thiserror::Error;

#[derive(Error, Debug)]
pub enum RefineryError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{table} export is missing required column {column:?}")]
    MissingColumn { table: String, column: String },

    #[error("unparsable currency amount {0:?}")]
    MalformedCurrency(String),

    #[error("geocoder error: {0}")]
    Geocoder(String),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),
}

pub type Result<T> = std::result::Result<T, RefineryError>;
