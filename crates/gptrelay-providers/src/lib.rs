//! Completion provider layer for gptrelay.
//!
//! - [`traits::CompletionProvider`]: trait the session layer calls
//! - [`error::CompletionError`]: every way a completion can fail
//! - [`http_provider::HttpProvider`]: OpenAI-compatible `/chat/completions` client

pub mod error;
pub mod http_provider;
pub mod traits;

pub use error::CompletionError;
pub use http_provider::HttpProvider;
pub use traits::CompletionProvider;
