use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("invalid post id {0:?}: expected a non-empty string of decimal digits")]
    InvalidPostId(String),

    #[error("invalid conversation stage {0}: expected 1, 2 or 3")]
    InvalidStage(u8),
}

#[derive(Error, Debug)]
pub enum TwitterError {
    #[error("rate limited by {endpoint}")]
    RateLimited { endpoint: String },

    #[error("API request to {endpoint} failed with status {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OAuth error: {0}")]
    OAuth(#[from] reqwest_oauth1::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("response from {0} carried no data")]
    MissingData(&'static str),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl TwitterError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, TwitterError::RateLimited { .. })
    }
}

/// True when an `anyhow` error chain bottoms out in a 429 from the social API.
pub fn is_rate_limited(err: &anyhow::Error) -> bool {
    err.downcast_ref::<TwitterError>()
        .is_some_and(TwitterError::is_rate_limited)
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} not set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed document {collection}/{key}: {reason}")]
    Malformed {
        collection: String,
        key: String,
        reason: String,
    },
}
