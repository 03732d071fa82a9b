use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("Index persistence failed: {0}")]
    Persistence(String),

    #[error("Index contains no entries")]
    EmptyIndex,

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Generation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected generation response: {0}")]
    UnexpectedResponse(String),
}

impl Error {
    /// Fixed sentence shown to the end user in place of the internal detail.
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "The agent is misconfigured. Check the configuration and try again.",
            Error::EmbeddingUnavailable(_) => "The embedding model is unavailable, so the documents could not be searched.",
            Error::Persistence(_) => "The document index could not be read or written.",
            Error::EmptyIndex => "The document index is empty. Please add some documents to the docs directory.",
            Error::Generation(_) => "The language model could not be reached. Please try again later.",
            Error::Timeout(_) => "The language model took too long to respond. Please try again.",
            Error::UnexpectedResponse(_) => "The language model returned a response in an unexpected format.",
        }
    }

    /// Whether a retry of the same request could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Generation(_) | Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
