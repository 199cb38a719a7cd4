//! Completion errors.

use thiserror::Error;

/// Why a completion call produced no text.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The HTTP client could not be built from the configuration.
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    /// Connection failure, timeout, or other transport error.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-success status.
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not a chat completion.
    #[error("malformed response: {0}")]
    Parse(String),

    /// The response parsed but carried no completion text.
    #[error("response contained no completion text")]
    EmptyResponse,
}
