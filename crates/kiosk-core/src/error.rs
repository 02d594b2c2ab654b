use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Parameter errors
    #[error("Invalid parameter {name}: {message}")]
    InvalidParameter { name: String, message: String },

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Unknown calling type: {0}")]
    InvalidCallingType(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
