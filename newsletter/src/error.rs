use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForumError {
    #[error("Rate limited by the forum api, reset in {reset:?}")]
    RateLimited { reset: Option<Duration> },

    #[error("Forum api error: {0}")]
    Api(String),

    #[error("Forum api returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Community {0} does not exist")]
    CommunityNotFound(String),

    #[error("Forum credentials were rejected")]
    Unauthorized,

    #[error("Access to community {0} is forbidden")]
    Forbidden(String),

    #[error("Http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected forum payload: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ForumError {
    /// Whether waiting and trying again may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ForumError::RateLimited { .. } | ForumError::Api(_) => true,
            ForumError::Status { status, .. } => *status == 408 || *status >= 500,
            ForumError::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            ForumError::CommunityNotFound(_)
            | ForumError::Unauthorized
            | ForumError::Forbidden(_)
            | ForumError::Decode(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search api returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must not be empty")]
    Empty(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Forum error: {0}")]
    Forum(#[from] ForumError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error(transparent)]
    Agent(#[from] agent::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
