use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Sensor error: {0}")]
    Sensor(String),

    #[error("Link error: {0}")]
    Link(String),

    #[error("Time sync error: {0}")]
    TimeSync(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
