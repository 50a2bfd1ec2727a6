use thiserror::Error;

#[derive(Error, Debug)]
pub enum InventoryError {
    /// More resources than the configured cap; the caller's scope is too broad.
    #[error("too many resources: {seen} enumerated, limit is {max}")]
    TooManyResources { max: usize, seen: usize },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("ARM request failed with {status} ({code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("no API version known for {provider}/{resource_type}")]
    NoApiVersion {
        provider: String,
        resource_type: String,
    },

    #[error("core error: {0}")]
    Core(#[from] vigil_core::VigilError),

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("operation cancelled")]
    Cancelled,
}
