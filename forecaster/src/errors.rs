use crate::model::Metric;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient history for {metric}: {available} points, need at least {required}")]
    InsufficientData {
        metric: Metric,
        available: usize,
        required: usize,
    },

    #[error("Remote store returned {status}: {body}")]
    Store { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
