//! Completion provider trait: the seam between sessions and the model API.
//!
//! `HttpProvider` covers every OpenAI-compatible API; tests substitute scripted
//! in-memory implementations.

use async_trait::async_trait;

use crate::error::CompletionError;

/// Something that turns an ordered prompt history into one completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Request a completion for `prompts`.
    ///
    /// The prompts are the full history of one conversation, oldest first.
    /// Implementations send them joined by `\n`, in order, as a single user turn.
    async fn complete(&self, prompts: &[String]) -> Result<String, CompletionError>;

    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    /// Display name for logging.
    fn display_name(&self) -> &str;
}
