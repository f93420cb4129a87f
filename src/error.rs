use thiserror::Error;

/// Failures surfaced by the completion client and the note store.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("completion API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("failed to read saved messages: {0}")]
    StorageRead(String),

    #[error("failed to write saved messages: {0}")]
    StorageWrite(String),

    #[error("no API key configured (set COMPANION_API_KEY or add api_key to the config file)")]
    MissingApiKey,
}

pub type Result<T> = std::result::Result<T, ChatError>;
