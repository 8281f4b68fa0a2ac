use thiserror::Error;

#[derive(Error, Debug)]
pub enum TributaryError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Not a feed and no alternate link found: {0}")]
    NotAFeed(String),

    #[error("Already subscribed: {0}")]
    DuplicateSubscription(String),

    #[error("Nothing parseable at {0}")]
    NotFound(String),

    #[error("Feed parsing error: {0}")]
    FeedParse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No such node in the subscription tree")]
    UnknownNode,

    #[error("Cannot move a category into itself or one of its descendants")]
    InvalidMove,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TributaryError>;
