use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubflowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Batch contains no jobs")]
    EmptyBatch,

    #[error("A batch is currently active: {0} rejected")]
    BusyBatch(String),

    #[error("File already present in the job list: {0}")]
    DuplicateJob(String),

    #[error("Malformed timestamp: {0}")]
    MalformedTimestamp(String),

    #[error("No subtitle entry with key {0}")]
    UnknownEntry(u32),

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

pub type Result<T> = std::result::Result<T, SubflowError>;
